//! Sharded LRU buffer pool over on-disk index pages.
//!
//! A miss loads a page from its slot in the index file (`LoadIndex`); an
//! eviction writes the page back to that same slot (`PageFlush`). Both use
//! positional I/O so concurrent flushes from different buffer-pool shards,
//! sharing one file descriptor, never race a `seek` against another
//! thread's `read`/`write`.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::ShardedLru;
use crate::config::PAGE_SIZE;
use crate::error::Result;
use crate::page::IndexPage;

/// A page handle shared between the buffer pool and whichever caller is
/// currently reading or mutating it.
pub type PageHandle = Arc<RwLock<IndexPage>>;

/// Sharded, capacity-accounted cache of index pages, write-back on eviction.
pub struct PagePool {
    cache: ShardedLru<u32, PageHandle>,
    file: Arc<File>,
}

impl PagePool {
    /// Builds a pool backed by `file`, with `shards` LRU shards sharing
    /// `capacity_bytes` total (each page is charged `PAGE_SIZE` bytes).
    pub fn new(file: Arc<File>, shards: usize, capacity_bytes: u64) -> Self {
        let flush_file = file.clone();
        let on_evict: Arc<dyn Fn(u32, PageHandle) + Send + Sync> =
            Arc::new(move |number, handle| {
                let page = handle.read();
                match write_page(&flush_file, &page) {
                    Ok(()) => {
                        tracing::debug!(
                            event = "page_flush",
                            page_number = number,
                            bytes_written = PAGE_SIZE,
                        );
                    }
                    Err(err) => {
                        tracing::error!(
                            event = "page_flush_failed",
                            page_number = number,
                            error = %err,
                        );
                    }
                }
            });

        PagePool {
            cache: ShardedLru::with_eviction_callback(shards, capacity_bytes, Some(on_evict)),
            file,
        }
    }

    /// Returns the page at `number`, loading it from disk on a cache miss.
    pub fn get_or_load(&self, number: u32) -> Result<PageHandle> {
        if let Some(handle) = self.cache.get(&number) {
            return Ok(handle);
        }
        let page = load_page(&self.file, number)?;
        let handle: PageHandle = Arc::new(RwLock::new(page));
        self.cache.insert(number, handle.clone(), PAGE_SIZE as u64);
        Ok(handle)
    }

    /// Re-inserts a page handle, marking it most-recently-used (and
    /// potentially dirty — every insertion is treated as such, per the
    /// write-through-on-evict design).
    pub fn touch(&self, number: u32, handle: PageHandle) {
        self.cache.insert(number, handle, PAGE_SIZE as u64);
    }

    /// Writes a brand-new page directly to its slot, bypassing the cache.
    /// Used at instance construction to persist the initial empty pages
    /// without immediately contending for buffer-pool capacity.
    pub fn write_direct(&self, page: &IndexPage) -> Result<()> {
        write_page(&self.file, page)
    }

    /// Flushes every cached page back to disk. Used on teardown.
    pub fn flush_all(&self) {
        self.cache.flush_all();
    }
}

fn write_page(file: &File, page: &IndexPage) -> Result<()> {
    let bytes = page.to_bytes();
    file.write_at(&bytes, page.number as u64 * PAGE_SIZE as u64)?;
    Ok(())
}

fn load_page(file: &File, number: u32) -> Result<IndexPage> {
    let mut buf = vec![0u8; PAGE_SIZE];
    file.read_at(&mut buf, number as u64 * PAGE_SIZE as u64)?;
    IndexPage::from_bytes(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_file(pages: u32) -> Arc<File> {
        let tmp = tempfile::tempfile().unwrap();
        tmp.set_len(pages as u64 * PAGE_SIZE as u64).unwrap();
        Arc::new(tmp)
    }

    #[test]
    fn miss_loads_an_empty_page_from_disk() {
        let file = fresh_file(2);
        // write a real page image for page 0 directly
        let page = IndexPage::empty(3, 0);
        file.write_at(&page.to_bytes(), 0).unwrap();

        let pool = PagePool::new(file, 1, PAGE_SIZE as u64 * 10);
        let handle = pool.get_or_load(0).unwrap();
        assert_eq!(handle.read().bits, 3);
        assert_eq!(handle.read().number, 0);
    }

    #[test]
    fn eviction_flushes_the_page_back_to_its_slot() {
        let file = fresh_file(4);
        // capacity for exactly one page, so the 2nd touch evicts the 1st
        let pool = PagePool::new(file.clone(), 1, PAGE_SIZE as u64);

        let mut a = IndexPage::empty(1, 0);
        a.try_append(0xAAAA, 111);
        pool.touch(0, Arc::new(RwLock::new(a)));

        let mut b = IndexPage::empty(1, 1);
        b.try_append(0xBBBB, 222);
        pool.touch(1, Arc::new(RwLock::new(b)));

        // page 0 should have been evicted and flushed to disk by now
        let mut buf = vec![0u8; PAGE_SIZE];
        file.read_at(&mut buf, 0).unwrap();
        let persisted = IndexPage::from_bytes(&buf).unwrap();
        assert_eq!(persisted.find(0xAAAA), Some(111));
    }

    #[test]
    fn flush_all_persists_every_cached_page() {
        let file = fresh_file(2);
        let pool = PagePool::new(file.clone(), 1, PAGE_SIZE as u64 * 10);

        let mut a = IndexPage::empty(1, 0);
        a.try_append(1, 10);
        pool.touch(0, Arc::new(RwLock::new(a)));

        pool.flush_all();

        let mut buf = vec![0u8; PAGE_SIZE];
        file.read_at(&mut buf, 0).unwrap();
        let persisted = IndexPage::from_bytes(&buf).unwrap();
        assert_eq!(persisted.find(1), Some(10));
    }
}
