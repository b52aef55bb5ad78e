//! Pool Tests
//!
//! Tests for:
//! - Command list checkout, scope-guard return and reuse
//! - Misuse of the command list pool (double return, foreign list)
//! - Transient slot acquire/release balance
//! - Transient texture recycling, trimming and disposal

use std::sync::Arc;

use xrp::core::{TextureDesc, TextureFormat, slots};
use xrp::{CommandListPool, DeviceCapabilities, PipelineError, RecordingContext, TransientResourceTable};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn color_desc(width: u32, height: u32, label: &'static str) -> TextureDesc {
    TextureDesc::color(width, height, TextureFormat::Rgba8Unorm, label)
}

// ============================================================================
// CommandListPool
// ============================================================================

#[test]
fn guard_returns_list_to_pool() {
    init_logger();
    let pool = CommandListPool::new();
    {
        let mut cmd = pool.get("DrawOpaque");
        cmd.set_global_float("_Test", 1.0);
        assert_eq!(pool.checked_out_count(), 1);
    }
    assert_eq!(pool.checked_out_count(), 0, "Dropped guard should return its list");
    assert_eq!(pool.free_count(), 1);
}

#[test]
fn reused_list_is_empty_and_renamed() {
    let pool = CommandListPool::new();
    let first_id = {
        let mut cmd = pool.get("First");
        cmd.set_global_float("_Test", 1.0);
        cmd.id()
    };
    let cmd = pool.get("Second");
    assert_eq!(cmd.id(), first_id, "Free list should be reused");
    assert!(cmd.is_empty(), "Reused list must not carry old commands");
    assert_eq!(cmd.name, "Second");
}

#[test]
fn nested_checkouts_get_distinct_lists() {
    let pool = CommandListPool::new();
    let a = pool.get("A");
    let b = pool.get("B");
    assert_ne!(a.id(), b.id());
    assert_eq!(pool.checked_out_count(), 2);
}

#[test]
fn detached_list_stays_checked_out_until_given_back() {
    init_logger();
    let pool = CommandListPool::new();
    let list = pool.get("Detached").detach();
    assert_eq!(pool.checked_out_count(), 1, "Detached list stays checked out");
    assert_eq!(pool.free_count(), 0);

    assert!(pool.give_back(list).is_ok());
    assert_eq!(pool.checked_out_count(), 0);
    assert_eq!(pool.free_count(), 1);
}

#[test]
fn foreign_list_is_rejected() {
    init_logger();
    let pool = CommandListPool::new();
    drop(pool.get("Warmup"));

    let other = CommandListPool::new();
    let foreign = other.get("Foreign").detach();
    let free_before = pool.free_count();
    match pool.give_back(foreign) {
        Err(PipelineError::CommandListNotAcquired { name, .. }) => assert_eq!(name, "Foreign"),
        other => panic!("Expected CommandListNotAcquired, got {other:?}"),
    }
    assert_eq!(pool.free_count(), free_before, "Pool must be untouched after misuse");
    assert_eq!(pool.checked_out_count(), 0);
}

#[test]
fn list_returned_twice_is_rejected() {
    init_logger();
    let pool = CommandListPool::new();
    let first = pool.get("Once").detach();
    assert!(pool.give_back(first).is_ok());

    // A second pool hands out a list with the same serial; returning it here
    // looks exactly like a second return of the first list.
    let twin_pool = CommandListPool::new();
    let twin = twin_pool.get("Once").detach();
    assert!(pool.give_back(twin).is_err());
    assert_eq!(pool.free_count(), 1);
}

#[test]
fn pool_is_shareable_across_threads() {
    let pool = Arc::new(CommandListPool::new());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let mut cmd = pool.get("Worker");
                cmd.set_global_int("_Index", i);
                cmd.commands.len()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 1);
    }
    assert_eq!(pool.checked_out_count(), 0);
}

// ============================================================================
// TransientResourceTable
// ============================================================================

#[test]
fn acquire_then_release_balances() {
    init_logger();
    let mut ctx = RecordingContext::new(DeviceCapabilities::default());
    let mut table = TransientResourceTable::new();

    let id = table
        .acquire(slots::CAMERA_COLOR, &color_desc(64, 64, slots::CAMERA_COLOR), &mut ctx)
        .unwrap();
    assert!(table.is_live(slots::CAMERA_COLOR));
    assert_eq!(table.get(slots::CAMERA_COLOR), Some(id));

    table.release(slots::CAMERA_COLOR).unwrap();
    assert_eq!(table.live_count(), 0);
    assert_eq!(
        ctx.live_texture_count(),
        1,
        "Released textures are pooled, not destroyed"
    );
}

#[test]
fn double_acquire_fails() {
    init_logger();
    let mut ctx = RecordingContext::new(DeviceCapabilities::default());
    let mut table = TransientResourceTable::new();
    let desc = color_desc(32, 32, slots::OPAQUE_TEXTURE);

    table.acquire(slots::OPAQUE_TEXTURE, &desc, &mut ctx).unwrap();
    let err = table.acquire(slots::OPAQUE_TEXTURE, &desc, &mut ctx).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::TransientAlreadyAcquired { slot } if slot == slots::OPAQUE_TEXTURE
    ));
    assert_eq!(ctx.textures_created(), 1, "Failed acquire must not allocate");
}

#[test]
fn release_without_acquire_fails() {
    init_logger();
    let mut table = TransientResourceTable::new();
    let err = table.release(slots::BLOOM_FINAL).unwrap_err();
    assert!(matches!(err, PipelineError::TransientNotAcquired { .. }));
    assert!(!table.release_if_live(slots::BLOOM_FINAL));
}

#[test]
fn compatible_descriptor_reuses_texture() {
    let mut ctx = RecordingContext::new(DeviceCapabilities::default());
    let mut table = TransientResourceTable::new();

    let a = table
        .acquire(slots::BLOOM_MIP_UP[0], &color_desc(128, 64, slots::BLOOM_MIP_UP[0]), &mut ctx)
        .unwrap();
    table.release(slots::BLOOM_MIP_UP[0]).unwrap();

    // Different slot and label, same size and format
    let b = table
        .acquire(slots::BLOOM_MIP_DOWN[0], &color_desc(128, 64, slots::BLOOM_MIP_DOWN[0]), &mut ctx)
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(ctx.textures_created(), 1);

    let c = table
        .acquire(slots::BLOOM_MIP_UP[0], &color_desc(64, 32, slots::BLOOM_MIP_UP[0]), &mut ctx)
        .unwrap();
    assert_ne!(b, c, "Different size must allocate a new texture");
    assert_eq!(ctx.textures_created(), 2);
}

#[test]
fn release_all_reports_leftovers() {
    let mut ctx = RecordingContext::new(DeviceCapabilities::default());
    let mut table = TransientResourceTable::new();
    for slot in slots::BLOOM_MIP_DOWN.iter().take(3).copied() {
        table.acquire(slot, &color_desc(16, 16, slot), &mut ctx).unwrap();
    }
    assert_eq!(table.release_all(), 3);
    assert_eq!(table.live_count(), 0);
    assert_eq!(table.release_all(), 0);
}

#[test]
fn trim_destroys_idle_textures() {
    let mut ctx = RecordingContext::new(DeviceCapabilities::default());
    let mut table = TransientResourceTable::new();
    table
        .acquire(slots::CAMERA_COLOR, &color_desc(64, 64, slots::CAMERA_COLOR), &mut ctx)
        .unwrap();
    table.release(slots::CAMERA_COLOR).unwrap();

    for _ in 0..3 {
        table.trim(3, &mut ctx);
    }
    assert_eq!(table.total_texture_count(), 1, "Three idle frames are tolerated");

    table.trim(3, &mut ctx);
    assert_eq!(table.total_texture_count(), 0);
    assert_eq!(ctx.textures_destroyed(), 1);
    assert_eq!(ctx.live_texture_count(), 0);
}

#[test]
fn dispose_destroys_live_and_free() {
    let mut ctx = RecordingContext::new(DeviceCapabilities::default());
    let mut table = TransientResourceTable::new();
    table
        .acquire(slots::CAMERA_COLOR, &color_desc(64, 64, slots::CAMERA_COLOR), &mut ctx)
        .unwrap();
    table
        .acquire(slots::CAMERA_DEPTH, &TextureDesc::depth(64, 64, 32, slots::CAMERA_DEPTH), &mut ctx)
        .unwrap();
    table.release(slots::CAMERA_COLOR).unwrap();

    table.dispose(&mut ctx);
    assert_eq!(ctx.live_texture_count(), 0);
    assert_eq!(table.total_texture_count(), 0);
}
