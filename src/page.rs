//! On-disk layout of a single index page.
//!
//! A page is exactly [`PAGE_SIZE`] bytes: a header padded out to
//! [`PAGE_HEADER_SIZE`] bytes, followed by [`NODES_PER_PAGE`] fixed-size node
//! slots. Only the first 16 bytes of a node slot are meaningful (a `u64`
//! hash and a `u64` offset); the remainder of the slot is reserved and kept
//! zero-filled so the on-disk image is stable even though nodes never use
//! the rest of it today.

use byteorder::{ByteOrder, LittleEndian};

use crate::config::{NODES_PER_PAGE, NODE_SLOT_SIZE, PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::error::{Error, Result};

/// A single (hash, offset) entry stored on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexNode {
    /// Full 64-bit hash of the key this node was inserted under.
    pub hash: u64,
    /// Byte offset of the record in the data file.
    pub offset: u64,
}

/// A fixed-size bucket of the extendible-hash directory.
#[derive(Debug, Clone)]
pub struct IndexPage {
    /// Local depth `ℓ` of this page.
    pub bits: u32,
    /// Page number, used as the buffer-pool cache key and the position of
    /// this page within its index file (`number * PAGE_SIZE` bytes in).
    pub number: u32,
    /// Occupied node slots. Always `<= NODES_PER_PAGE`.
    pub nodes: Vec<IndexNode>,
}

impl IndexPage {
    /// Builds a new, empty page with the given local depth and page number.
    pub fn empty(bits: u32, number: u32) -> Self {
        IndexPage {
            bits,
            number,
            nodes: Vec::new(),
        }
    }

    /// Whether this page has room for one more node.
    pub fn has_room(&self) -> bool {
        self.nodes.len() < NODES_PER_PAGE
    }

    /// Indices of every node sharing `hash`. A page can legitimately hold
    /// more than one node for the same hash when distinct keys collide
    /// under [`crate::hash::murmur2a_64`]; disambiguating them requires
    /// comparing the actual key bytes stored in the data file, which this
    /// page has no access to — that's the caller's job.
    pub fn indices_with_hash(&self, hash: u64) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.hash == hash)
            .map(|(i, _)| i)
    }

    /// The offset stored at node slot `i`.
    pub fn offset_at(&self, i: usize) -> u64 {
        self.nodes[i].offset
    }

    /// Offset of the first node matching `hash`, if any. A convenience for
    /// call sites that don't need to disambiguate hash collisions against
    /// the data file themselves (tests, mostly); `ExtendibleHashIndex::get_value`
    /// scans every matching node and compares full keys instead.
    pub fn find(&self, hash: u64) -> Option<u64> {
        self.nodes.iter().find(|n| n.hash == hash).map(|n| n.offset)
    }

    /// Overwrites the offset stored at node slot `i` in place (the node
    /// count, and every other node, is untouched).
    pub fn set_offset_at(&mut self, i: usize, offset: u64) {
        self.nodes[i].offset = offset;
    }

    /// Appends a brand-new node. Returns `false` if the page has no room,
    /// in which case the caller must split or double and retry.
    pub fn try_append(&mut self, hash: u64, offset: u64) -> bool {
        if !self.has_room() {
            return false;
        }
        self.nodes.push(IndexNode { hash, offset });
        true
    }

    /// Whether every node on this page shares the same hash, meaning a split
    /// on that hash's prefix bit cannot separate them.
    pub fn all_same_hash(&self) -> bool {
        match self.nodes.first() {
            None => false,
            Some(first) => self.nodes.iter().all(|n| n.hash == first.hash),
        }
    }

    /// Serializes this page into its fixed-size on-disk image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; PAGE_SIZE];

        LittleEndian::write_u32(&mut buf[0..4], self.bits);
        LittleEndian::write_u32(&mut buf[4..8], self.number);
        LittleEndian::write_u64(&mut buf[8..16], self.nodes.len() as u64);

        for (i, node) in self.nodes.iter().enumerate() {
            let slot_start = PAGE_HEADER_SIZE + i * NODE_SLOT_SIZE;
            LittleEndian::write_u64(&mut buf[slot_start..slot_start + 8], node.hash);
            LittleEndian::write_u64(&mut buf[slot_start + 8..slot_start + 16], node.offset);
        }

        buf
    }

    /// Parses a page from its fixed-size on-disk image.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != PAGE_SIZE {
            return Err(Error::Decode(format!(
                "page image has {} bytes, expected {PAGE_SIZE}",
                buf.len()
            )));
        }

        let bits = LittleEndian::read_u32(&buf[0..4]);
        let number = LittleEndian::read_u32(&buf[4..8]);
        let num = LittleEndian::read_u64(&buf[8..16]) as usize;

        if num > NODES_PER_PAGE {
            return Err(Error::Decode(format!(
                "page {number} claims {num} nodes, page geometry only holds {NODES_PER_PAGE}"
            )));
        }

        let mut nodes = Vec::with_capacity(num);
        for i in 0..num {
            let slot_start = PAGE_HEADER_SIZE + i * NODE_SLOT_SIZE;
            let hash = LittleEndian::read_u64(&buf[slot_start..slot_start + 8]);
            let offset = LittleEndian::read_u64(&buf[slot_start + 8..slot_start + 16]);
            nodes.push(IndexNode { hash, offset });
        }

        Ok(IndexPage {
            bits,
            number,
            nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_page_round_trips() {
        let page = IndexPage::empty(3, 7);
        let bytes = page.to_bytes();
        assert_eq!(bytes.len(), PAGE_SIZE);
        let back = IndexPage::from_bytes(&bytes).unwrap();
        assert_eq!(back.bits, 3);
        assert_eq!(back.number, 7);
        assert!(back.nodes.is_empty());
    }

    #[test]
    fn populated_page_round_trips() {
        let mut page = IndexPage::empty(2, 0);
        assert!(page.try_append(0xAAAA, 100));
        assert!(page.try_append(0xBBBB, 200));
        let bytes = page.to_bytes();
        let back = IndexPage::from_bytes(&bytes).unwrap();
        assert_eq!(
            back.indices_with_hash(0xAAAA)
                .map(|i| back.offset_at(i))
                .collect::<Vec<_>>(),
            vec![100]
        );
        assert_eq!(
            back.indices_with_hash(0xBBBB)
                .map(|i| back.offset_at(i))
                .collect::<Vec<_>>(),
            vec![200]
        );
        assert!(back.indices_with_hash(0xCCCC).next().is_none());
    }

    #[test]
    fn set_offset_at_overwrites_in_place_without_growing_node_count() {
        let mut page = IndexPage::empty(0, 0);
        assert!(page.try_append(1, 10));
        let i = page.indices_with_hash(1).next().unwrap();
        page.set_offset_at(i, 20);
        assert_eq!(page.nodes.len(), 1);
        assert_eq!(page.offset_at(i), 20);
    }

    #[test]
    fn try_append_fails_once_full() {
        let mut page = IndexPage::empty(0, 0);
        for i in 0..NODES_PER_PAGE {
            assert!(page.try_append(i as u64, i as u64));
        }
        assert!(!page.has_room());
        assert!(!page.try_append(0xFFFF, 0));
    }

    #[test]
    fn colliding_hashes_can_coexist_as_distinct_nodes() {
        let mut page = IndexPage::empty(0, 0);
        assert!(page.try_append(42, 1));
        assert!(page.try_append(42, 2));
        assert_eq!(page.nodes.len(), 2);
        let offsets: Vec<u64> = page.indices_with_hash(42).map(|i| page.offset_at(i)).collect();
        assert_eq!(offsets, vec![1, 2]);
    }

    #[test]
    fn all_same_hash_detects_unsplittable_collisions() {
        let mut page = IndexPage::empty(0, 0);
        assert!(!page.all_same_hash());
        page.try_append(42, 1);
        assert!(page.all_same_hash());
        page.try_append(42, 2);
        assert!(page.all_same_hash());
    }

    #[test]
    fn find_returns_the_first_matching_offset() {
        let mut page = IndexPage::empty(0, 0);
        page.try_append(42, 1);
        page.try_append(42, 2);
        assert_eq!(page.find(42), Some(1));
        assert_eq!(page.find(99), None);
    }

    #[test]
    fn rejects_wrong_sized_image() {
        let err = IndexPage::from_bytes(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
