//! WordprocessingML element and attribute names the merge engine looks at.

pub const PARAGRAPH: &str = "w:p";
pub const RUN: &str = "w:r";
pub const RUN_PROPERTIES: &str = "w:rPr";
pub const TEXT: &str = "w:t";
pub const BREAK: &str = "w:br";
pub const TABLE_ROW: &str = "w:tr";
pub const TABLE_CELL: &str = "w:tc";

pub const SIMPLE_FIELD: &str = "w:fldSimple";
pub const FIELD_INSTRUCTION: &str = "w:instr";
pub const FIELD_CHAR: &str = "w:fldChar";
pub const FIELD_CHAR_TYPE: &str = "w:fldCharType";
pub const INSTRUCTION_TEXT: &str = "w:instrText";

pub const PICTURE_PROPERTIES: &str = "pic:cNvPr";
pub const BLIP: &str = "a:blip";
pub const EMBED: &str = "r:embed";

pub const XML_SPACE: &str = "xml:space";

/// Run-level containers that may replace a run without breaking the paragraph.
pub const INLINE_ELEMENTS: &[&str] = &[RUN, "w:hyperlink", "w:ins", "w:del"];
