//! Flash medium abstraction.
//!
//! The firmware's flash driver implements [`FlashMedium`] over the two
//! reserved partitions; tests use [`mock::MockFlash`], which can simulate a
//! power loss part-way through a program operation.

/// Size of one mirrored region in bytes.
pub const REGION_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumError {
    /// Image larger than a region.
    OutOfSpace,
    /// The medium reported a program/erase failure.
    Io,
    /// Simulated or real power loss mid-operation.
    PowerLoss,
}

impl core::fmt::Display for MediumError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MediumError::OutOfSpace => write!(f, "Image exceeds region size"),
            MediumError::Io => write!(f, "Flash I/O failure"),
            MediumError::PowerLoss => write!(f, "Power lost during flash operation"),
        }
    }
}

/// Two-region byte medium with erase-before-program semantics.
pub trait FlashMedium {
    /// Reads the full contents of region 0 or 1.
    fn read_region(&self, region: usize) -> Vec<u8>;

    /// Erases and programs a region in one logical operation.
    fn program_region(&mut self, region: usize, data: &[u8]) -> Result<(), MediumError>;
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::{FlashMedium, MediumError, REGION_SIZE};

    /// RAM-backed medium with optional power-loss injection.
    pub struct MockFlash {
        regions: [Vec<u8>; 2],
        /// When set, the next program operation writes only this many bytes
        /// and then fails with `PowerLoss`.
        fail_after: Option<usize>,
        pub program_count: usize,
    }

    impl MockFlash {
        pub fn new() -> MockFlash {
            MockFlash {
                regions: [vec![0xFF; REGION_SIZE], vec![0xFF; REGION_SIZE]],
                fail_after: None,
                program_count: 0,
            }
        }

        /// Arms a power loss after `bytes` of the next program operation.
        pub fn fail_next_program_after(&mut self, bytes: usize) {
            self.fail_after = Some(bytes);
        }
    }

    impl Default for MockFlash {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FlashMedium for MockFlash {
        fn read_region(&self, region: usize) -> Vec<u8> {
            self.regions[region].clone()
        }

        fn program_region(&mut self, region: usize, data: &[u8]) -> Result<(), MediumError> {
            if data.len() > REGION_SIZE {
                return Err(MediumError::OutOfSpace);
            }
            self.program_count += 1;

            // erase
            self.regions[region] = vec![0xFF; REGION_SIZE];

            if let Some(cut) = self.fail_after.take() {
                let cut = cut.min(data.len());
                self.regions[region][..cut].copy_from_slice(&data[..cut]);
                return Err(MediumError::PowerLoss);
            }

            self.regions[region][..data.len()].copy_from_slice(data);
            Ok(())
        }
    }
}
