use std::fmt;
use std::sync::Arc;

/// An opaque, hashable, comparable handle naming one logical resource.
///
/// Identity is by name: two tags carrying equal names denote the same
/// resource, no matter where they were created. Tags are cheap to clone
/// (the name is shared) and are minted by
/// [`Engine::new_variable`](crate::Engine::new_variable) or
/// [`Engine::new_named_variable`](crate::Engine::new_named_variable);
/// they are never destroyed while the engine is live.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceTag {
    name: Arc<str>,
}

impl ResourceTag {
    pub(crate) fn new(name: &str) -> ResourceTag {
        ResourceTag {
            name: Arc::from(name),
        }
    }

    /// The name this tag was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ResourceTag {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "ResourceTag({})", self.name)
    }
}

impl fmt::Display for ResourceTag {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.name)
    }
}
