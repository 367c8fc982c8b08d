//! # Paging Configuration
//!
//! [`init_paging`] fixes, once, the parameters every [`PageTable`](crate::PageTable)
//! is built from: which frame pools supply tables and pages, how large the
//! shared identity-mapped region is, and how the tables are reached
//! ([`TableLayout`]).

use kernel_alloc::{FramePoolError, PoolHandle};
use kernel_info::memory::TABLE_SPAN;
use log::info;

/// How page directories and tables are reached once paging is enabled.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TableLayout {
    /// Tables come from the process pool and are edited through the recursive
    /// window at the top of the address space.
    #[default]
    Recursive,

    /// Tables come from the kernel pool, which lies inside the shared region,
    /// and are edited through their identity-mapped physical addresses.
    IdentityMapped,
}

/// Errors raised while setting up paging.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PagingError {
    #[error("shared region size {0:#x} is not a non-zero multiple of 4 MiB below the table window")]
    InvalidSharedSize(u32),
    #[error("out of frames for paging structures: {0}")]
    OutOfFrames(#[from] FramePoolError),
}

/// Parameters shared by every page table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PagingConfig {
    kernel_pool: PoolHandle,
    process_pool: PoolHandle,
    shared_size: u32,
    layout: TableLayout,
}

/// Record the pools and shared region size used by all page tables.
///
/// The layout defaults to [`TableLayout::Recursive`].
///
/// # Errors
/// [`PagingError::InvalidSharedSize`] unless `shared_size` is a non-zero multiple
/// of 4 MiB that leaves the last directory entry free.
pub fn init_paging(
    kernel_pool: PoolHandle,
    process_pool: PoolHandle,
    shared_size: u32,
) -> Result<PagingConfig, PagingError> {
    let tables = shared_size / TABLE_SPAN;
    if shared_size == 0 || !shared_size.is_multiple_of(TABLE_SPAN) || tables >= 1024 - 1 {
        return Err(PagingError::InvalidSharedSize(shared_size));
    }

    info!("Initialized paging: shared region of {shared_size:#x} bytes ({tables} table(s))");
    Ok(PagingConfig {
        kernel_pool,
        process_pool,
        shared_size,
        layout: TableLayout::Recursive,
    })
}

impl PagingConfig {
    /// The same configuration with a different table layout.
    #[must_use]
    pub const fn with_layout(mut self, layout: TableLayout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub const fn kernel_pool(&self) -> PoolHandle {
        self.kernel_pool
    }

    #[must_use]
    pub const fn process_pool(&self) -> PoolHandle {
        self.process_pool
    }

    /// Bytes identity mapped at the bottom of every address space.
    #[must_use]
    pub const fn shared_size(&self) -> u32 {
        self.shared_size
    }

    #[must_use]
    pub const fn layout(&self) -> TableLayout {
        self.layout
    }

    /// Number of page tables needed for the shared region.
    #[must_use]
    pub const fn shared_tables(&self) -> u32 {
        self.shared_size / TABLE_SPAN
    }

    /// Pool supplying directory and table frames.
    #[must_use]
    pub const fn table_pool(&self) -> PoolHandle {
        match self.layout {
            TableLayout::Recursive => self.process_pool,
            TableLayout::IdentityMapped => self.kernel_pool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedMachine;
    use crate::testing::standard_pools;

    #[test]
    fn shared_size_must_be_whole_tables() {
        let sim = SimulatedMachine::new();
        let (_frames, k, p) = standard_pools(&sim);
        assert_eq!(init_paging(k, p, 0), Err(PagingError::InvalidSharedSize(0)));
        assert_eq!(
            init_paging(k, p, 0x0010_0000),
            Err(PagingError::InvalidSharedSize(0x0010_0000))
        );
        assert_eq!(
            init_paging(k, p, 1023 * TABLE_SPAN),
            Err(PagingError::InvalidSharedSize(1023 * TABLE_SPAN))
        );

        let config = init_paging(k, p, 2 * TABLE_SPAN).expect("valid");
        assert_eq!(config.shared_tables(), 2);
        assert_eq!(config.layout(), TableLayout::Recursive);
    }

    #[test]
    fn layout_selects_table_pool() {
        let sim = SimulatedMachine::new();
        let (_frames, k, p) = standard_pools(&sim);
        let config = init_paging(k, p, TABLE_SPAN).expect("valid");
        assert_eq!(config.table_pool(), p);
        assert_eq!(config.with_layout(TableLayout::IdentityMapped).table_pool(), k);
    }
}
