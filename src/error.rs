use std::fmt;

/// Everything that can stop the fluid engine. None of these are transient,
/// so nothing in the crate retries.
#[derive(Debug, Clone, PartialEq)]
pub enum FluidError {
    /// A kernel program could not be built or is missing an entry point.
    KernelBuild { program: String, log: String },
    /// A buffer does not hold one element per particle.
    InconsistentBuffer {
        name: &'static str,
        len: usize,
        expected: usize,
    },
    /// The particle count does not fit into a 32 bit sort key.
    SortBitWidth { count: usize },
    /// The readback producer went away before delivering its data.
    ReadbackDisconnected,
}

impl fmt::Display for FluidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FluidError::KernelBuild { program, log } => {
                write!(f, "program `{}` failed to build: {}", program, log)
            }
            FluidError::InconsistentBuffer {
                name,
                len,
                expected,
            } => write!(
                f,
                "inconsistent {} ({}) for {} particles",
                name, len, expected
            ),
            FluidError::SortBitWidth { count } => {
                write!(f, "cannot encode {} particles into a sort key", count)
            }
            FluidError::ReadbackDisconnected => write!(f, "readback channel disconnected"),
        }
    }
}

impl std::error::Error for FluidError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inconsistent_buffer_message_names_the_buffer() {
        let err = FluidError::InconsistentBuffer {
            name: "normals",
            len: 3,
            expected: 4,
        };
        assert_eq!(err.to_string(), "inconsistent normals (3) for 4 particles");
    }
}
