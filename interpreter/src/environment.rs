use std::collections::HashMap;

use crate::media::{MediaCollection, MediaRegistry};
use crate::runtime_value::{Map, RuntimeValue, transform_map};

/// What a lookup of a name that is nowhere in scope produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Missing names are nil.
    #[default]
    Lenient,
    /// Missing names are a context error.
    Strict,
}

/// A single scope level, pushed once per loop iteration.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: HashMap<String, RuntimeValue>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    /// A scope binding exactly one name, as a loop iteration does.
    pub fn binding(name: impl Into<String>, value: RuntimeValue) -> Self {
        let mut scope = Scope::new();
        scope.set_variable(name, value);
        scope
    }

    pub fn get_variable(&self, name: &str) -> Option<&RuntimeValue> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: RuntimeValue) {
        self.variables.insert(name.into(), value);
    }
}

/// The caller's context plus a stack of scopes layered over it.
///
/// The root context is never mutated; loops push a scope overlaying their
/// iterator name and pop it again when the iteration is done.
#[derive(Debug)]
pub struct Environment {
    context: Map,
    scopes: Vec<Scope>,
    policy: MissingPolicy,
    media: Box<dyn MediaRegistry>,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new(Map::new())
    }
}

impl Environment {
    /// Build an environment over `context`. Keys prefixed `word_ml:` are
    /// turned into raw markup content under the unprefixed key.
    pub fn new(context: Map) -> Self {
        Environment {
            context: transform_map(context),
            scopes: Vec::new(),
            policy: MissingPolicy::default(),
            media: Box::new(MediaCollection::new()),
        }
    }

    pub fn with_policy(mut self, policy: MissingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_media(mut self, media: Box<dyn MediaRegistry>) -> Self {
        self.media = media;
        self
    }

    pub fn policy(&self) -> MissingPolicy {
        self.policy
    }

    pub fn context(&self) -> &Map {
        &self.context
    }

    /// The media registry, e.g. to collect the registered images once the
    /// parts are processed.
    pub fn media(&self) -> &dyn MediaRegistry {
        self.media.as_ref()
    }

    pub fn media_mut(&mut self) -> &mut dyn MediaRegistry {
        self.media.as_mut()
    }

    pub fn push_scope(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    pub fn pop_scope(&mut self) -> Option<Scope> {
        self.scopes.pop()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Look up a variable, searching from innermost scope outward and
    /// finally in the root context.
    pub fn get_variable(&self, name: &str) -> Option<&RuntimeValue> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get_variable(name) {
                return Some(value);
            }
        }
        self.context.get(name)
    }
}
