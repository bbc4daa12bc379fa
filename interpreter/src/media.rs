use std::fmt;

use tracing::debug;

use crate::content::Image;

/// Issues relationship ids for embedded images.
///
/// The package layer that actually writes media parts and relationship
/// entries lives outside this crate; it plugs in here.
pub trait MediaRegistry: fmt::Debug {
    fn register(&mut self, image: &Image) -> String;

    /// Images registered so far with their ids, for registries that keep them.
    fn images(&self) -> &[(String, Image)] {
        &[]
    }
}

/// In-memory registry handing out sequential ids and keeping the payloads
/// for whoever writes the package afterwards.
#[derive(Debug)]
pub struct MediaCollection {
    prefix: String,
    images: Vec<(String, Image)>,
}

impl MediaCollection {
    pub fn new() -> Self {
        Self::with_prefix("rIdDocmerge")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        MediaCollection {
            prefix: prefix.into(),
            images: Vec::new(),
        }
    }
}

impl Default for MediaCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaRegistry for MediaCollection {
    fn register(&mut self, image: &Image) -> String {
        if let Some((rid, _)) = self
            .images
            .iter()
            .find(|(_, known)| known.name == image.name && known.data == image.data)
        {
            return rid.clone();
        }

        let rid = format!("{}{}", self.prefix, self.images.len() + 1);
        debug!(name = %image.name, rid = %rid, "registered image");
        self.images.push((rid.clone(), image.clone()));
        rid
    }

    fn images(&self) -> &[(String, Image)] {
        &self.images
    }
}
