use std::fmt;

/// Handle assigned to each registered system.
///
/// Handles come from a per-scheduler sequence and are never reused, so the
/// ordering of handles is the registration order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemHandle(u32);

impl SystemHandle {
    pub(crate) fn new(sequence: u32) -> Self {
        Self(sequence)
    }

    /// Registration sequence number backing this handle.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
