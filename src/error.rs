//! Error types.

use crate::{kernels::KernelId, variant::VariantId};

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SuiteError>;

#[derive(Error, Debug)]
pub enum SuiteError {
    #[error("failed to allocate a buffer of {len} elements")]
    Allocation { len: usize },

    /// Known variant that this build (or kernel) cannot run. Never fatal.
    #[error("{kernel}: variant `{variant}` is not supported in this build")]
    UnsupportedVariant { kernel: KernelId, variant: VariantId },

    #[error("unknown variant `{0}`")]
    UnknownVariant(String),

    #[error("unknown kernel or group `{0}`")]
    UnknownKernel(String),

    #[error("{0}: kernel buffers are not set up")]
    NotSetUp(KernelId),

    #[error("device transfer failed: {0}")]
    DeviceTransfer(String),

    #[error("device runtime error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SuiteError {
    /// Whether the error should abandon the current kernel variant run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::UnsupportedVariant { .. } | Self::UnknownVariant(_) | Self::UnknownKernel(_)
        )
    }
}

#[cfg(feature = "opencl")]
impl From<ocl::Error> for SuiteError {
    fn from(e: ocl::Error) -> Self {
        Self::Device(e.to_string())
    }
}

#[cfg(feature = "cuda")]
impl From<cust::error::CudaError> for SuiteError {
    fn from(e: cust::error::CudaError) -> Self {
        Self::Device(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lookup_errors_are_non_fatal() {
        let unsupported = SuiteError::UnsupportedVariant {
            kernel: KernelId::StreamAdd,
            variant: VariantId::BaseDevice,
        };
        assert!(!unsupported.is_fatal());
        assert!(!SuiteError::UnknownVariant("Foo".into()).is_fatal());
        assert!(SuiteError::Allocation { len: 4 }.is_fatal());
        assert!(SuiteError::DeviceTransfer("lost".into()).is_fatal());
    }

    #[test]
    fn messages_name_kernel_and_variant() {
        let e = SuiteError::UnsupportedVariant {
            kernel: KernelId::AppsFir,
            variant: VariantId::PortableOffload,
        };
        assert_eq!(
            e.to_string(),
            "Apps_FIR: variant `Portable_Offload` is not supported in this build"
        );
    }
}
