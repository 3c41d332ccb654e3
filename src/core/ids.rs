use uuid::Uuid;

/// Single id-generation capability shared by the registry, the pipeline and
/// the dispatcher. Keeping one source makes id format changes and
/// deterministic test substitution a one-line affair.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator;

impl IdGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Fresh unique id for messages, sessions and correlation.
    pub fn next(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Fresh channel identifier in the channel namespace.
    pub fn next_chid(&self, domain: &str) -> String {
        format!("#{}@{domain}", Uuid::new_v4())
    }
}
