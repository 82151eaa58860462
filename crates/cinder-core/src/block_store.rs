//! Content-addressed block persistence.
//!
//! Blocks are stored under their 32-byte header hash, with no other
//! namespace prefix; every other keyspace user carries a prefix or a
//! different key length, so raw 32-byte keys are unambiguous. This store
//! enforces no chain invariants.

use std::sync::Arc;

use crate::codec;
use crate::error::ChainError;
use crate::store::KvStore;
use crate::types::{Block, Hash256, Header};

pub struct BlockStore<S: KvStore> {
    store: Arc<S>,
}

impl<S: KvStore> BlockStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persist a block under its header hash. Idempotent.
    pub fn put(&self, block: &Block) -> Result<(), ChainError> {
        let hash = block.header.hash();
        let encoded = codec::encode(block)?;
        self.store.put(hash.as_bytes(), &encoded)?;
        Ok(())
    }

    pub fn get(&self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        match self.store.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_header(&self, hash: &Hash256) -> Result<Option<Header>, ChainError> {
        Ok(self.get(hash)?.map(|block| block.header))
    }

    /// Decode the header of every stored block. Used to rebuild the header
    /// index at startup.
    pub fn scan_headers(&self) -> Result<Vec<(Hash256, Header)>, ChainError> {
        let mut headers = Vec::new();
        for (key, value) in self.store.iter_prefix(&[])? {
            if key.len() != 32 {
                continue;
            }
            let Some(hash) = Hash256::from_slice(&key) else {
                continue;
            };
            let block: Block = codec::decode(&value)?;
            headers.push((hash, block.header));
        }
        Ok(headers)
    }
}
