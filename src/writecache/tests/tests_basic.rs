#[cfg(test)]
mod tests {
    use crate::allocator::Allocator;
    use crate::format::{Tier, TsdbRangIndex, BLOCK_HEADER_LEN};
    use crate::metastore::MetaStore;
    use crate::writecache::{WriteCache, WriteCacheError};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tracing_subscriber::EnvFilter;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn new_cache(temp: &TempDir, tier: Tier) -> WriteCache {
        let metastore = Arc::new(MetaStore::open(temp.path()).unwrap());
        let allocator = Arc::new(Allocator::new(temp.path(), metastore));
        WriteCache::new_head(temp.path(), "orders", tier, allocator).unwrap()
    }

    #[test]
    fn val_append_returns_increasing_addresses() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let mut cache = new_cache(&temp, Tier::Val);
        let a1 = cache.append(b"hello").unwrap();
        let a2 = cache.append(b"world").unwrap();
        assert_eq!(a1.seg_no, a2.seg_no);
        assert!(a2.seg_offset > a1.seg_offset);
        assert_eq!(a1.seg_offset, BLOCK_HEADER_LEN as u32);
    }

    #[test]
    fn idx_append_is_fixed_width() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let mut cache = new_cache(&temp, Tier::Idx);
        let rec = vec![0u8; crate::format::IDX_RECORD_LEN];
        let a1 = cache.append(&rec).unwrap();
        let a2 = cache.append(&rec).unwrap();
        assert_eq!(
            a2.seg_offset - a1.seg_offset,
            crate::format::IDX_RECORD_LEN as u32
        );
    }

    #[test]
    fn oversized_record_fails_without_mutating_state() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let mut cache = new_cache(&temp, Tier::Val);
        let huge = vec![0u8; Tier::Val.block_size()];
        let before = cache.block().header.len;
        let err = cache.append(&huge).unwrap_err();
        assert!(matches!(err, WriteCacheError::TooLong { .. }));
        assert_eq!(cache.block().header.len, before);
    }

    #[test]
    fn roll_over_links_prev_to_old_block_address() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let mut cache = new_cache(&temp, Tier::Val);
        let old_addr = cache.addr();

        let almost_full = vec![0u8; Tier::Val.block_size() - BLOCK_HEADER_LEN - 12];
        cache.append(&almost_full).unwrap();
        // This append doesn't fit and forces a roll-over.
        cache.append(b"0123456789abcdef").unwrap();

        assert_ne!(cache.addr(), old_addr);
        assert_eq!(cache.block().header.prev, old_addr);
        assert!(cache.block().header.next.is_null());
    }

    #[test]
    fn update_tail_ridx_first_call_assigns_off_one() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let mut cache = new_cache(&temp, Tier::RIdx);
        let mut rec = TsdbRangIndex {
            low: 10,
            high: 11,
            off: 0,
            addr: crate::format::BlockAddr {
                seg_no: 1,
                seg_offset: 0,
            },
        };
        cache.update_tail_ridx(&mut rec).unwrap();
        assert_eq!(rec.off, 1);
        assert_eq!(cache.block().header.len, crate::format::RIDX_RECORD_LEN as u32);
    }

    #[test]
    fn update_tail_ridx_rewrites_same_slot_without_growing_len() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let mut cache = new_cache(&temp, Tier::RIdx);
        let mut rec = TsdbRangIndex {
            low: 10,
            high: 11,
            off: 0,
            addr: crate::format::BlockAddr {
                seg_no: 1,
                seg_offset: 0,
            },
        };
        cache.update_tail_ridx(&mut rec).unwrap();
        let len_after_first = cache.block().header.len;

        rec.high = 50;
        cache.update_tail_ridx(&mut rec).unwrap();
        assert_eq!(cache.block().header.len, len_after_first);
    }
}
