//! Fuzz test for capacity planning
//!
//! Plans must never exceed free space, the size limit or the fast mode cap.

#![no_main]

use arbitrary::Arbitrary;
use flashcheck_core::{CapacityMode, CapacityPlan, TestConfig};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    free_space: u64,
    full: bool,
    block_size: u32,
    limit: Option<u64>,
}

fuzz_target!(|input: Input| {
    let block_size = (input.block_size as usize).max(1);
    let config = TestConfig::new()
        .fast_block_size(block_size)
        .full_block_size(block_size)
        .capacity_size_limit(input.limit);
    let mode = if input.full {
        CapacityMode::Full
    } else {
        CapacityMode::Fast
    };

    let plan = CapacityPlan::new(mode, input.free_space, &config);

    assert!(plan.test_size <= input.free_space);
    assert!(plan.blocks.saturating_mul(plan.block_size) <= plan.test_size);
    if let Some(limit) = input.limit {
        assert!(plan.test_size <= limit);
    }
    if mode == CapacityMode::Fast {
        assert!(plan.test_size <= config.fast_max_bytes);
    }
});
