use crate::resource::Resource;

/// Pure grouping construct; never materialized, exposes no capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group;

impl Group {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Resource for Group {
    fn kind(&self) -> &str {
        "Construct"
    }

    fn properties(&self) -> Option<serde_json::Value> {
        None
    }
}
