//! Block-batch files for bootstrapping a node from another one's DAG.
//!
//! Layout: a little-endian `u32` block count, then one record per block of
//! a little-endian `u32` length followed by the bincode block bytes.
//! Genesis is never written; every node already has it.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dagchain_types::{Block, BlockHash, BlockId};

use crate::chain::BlockChain;
use crate::sanity::check_block_sanity;
use crate::{BehaviorFlags, ChainError};

/// File name used inside an export directory.
pub const IBD_FILE_NAME: &str = "blocks.ibd";

/// How the export walks the DAG.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportOrder {
    /// Linear order, which is also a valid import order.
    ByOrder,
    /// Arrival ids, including blocks that were never ordered.
    ById,
}

impl BlockChain {
    /// Write every block from position 1 up to `end` (inclusive; the main
    /// tip or the last id when `None`). Returns the number of blocks written.
    pub fn export_blocks<W: Write>(
        &self,
        writer: &mut W,
        order: ExportOrder,
        end: Option<BlockHash>,
    ) -> Result<usize, ChainError> {
        let hashes = self.export_hashes(order, end)?;

        let mut records = Vec::with_capacity(hashes.len());
        for hash in &hashes {
            let block = self.load_block(hash)?;
            let bytes = block
                .to_bytes()
                .map_err(|e| ChainError::Structural(e.to_string()))?;
            records.push(bytes);
        }

        writer.write_all(&(records.len() as u32).to_le_bytes())?;
        for bytes in &records {
            writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
            writer.write_all(bytes)?;
        }
        writer.flush()?;
        tracing::info!(blocks = records.len(), order = ?order, "exported blocks");
        Ok(records.len())
    }

    /// Export into `dir`/[`IBD_FILE_NAME`]. Returns the file path.
    pub fn export_blocks_to_dir(
        &self,
        dir: &Path,
        order: ExportOrder,
        end: Option<BlockHash>,
    ) -> Result<PathBuf, ChainError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(IBD_FILE_NAME);
        let mut writer = BufWriter::new(File::create(&path)?);
        self.export_blocks(&mut writer, order, end)?;
        Ok(path)
    }

    /// Feed every block of a batch through sanity checks and fast-add
    /// acceptance. The chain must hold nothing but genesis.
    pub fn import_blocks<R: Read>(&self, reader: &mut R) -> Result<usize, ChainError> {
        let main_order = self.best_snapshot().main_order();
        if main_order != 0 {
            return Err(ChainError::Structural(format!(
                "import requires an empty chain, main order is {}",
                main_order
            )));
        }

        let count = read_u32(reader)?;
        let mut imported = 0;
        for index in 0..count {
            if self.is_halted() {
                return Err(ChainError::Halted);
            }
            if self.shutdown.is_shutdown_requested() {
                return Err(ChainError::ShuttingDown);
            }

            let len = read_u32(reader)? as u64;
            if len > self.params.max_block_size {
                return Err(ChainError::Structural(format!(
                    "record {} claims {} bytes, limit is {}",
                    index, len, self.params.max_block_size
                )));
            }
            let mut bytes = vec![0u8; len as usize];
            reader.read_exact(&mut bytes)?;
            let block = Block::from_bytes(&bytes)
                .map_err(|e| ChainError::Structural(format!("record {}: {}", index, e)))?;

            let hash = block.hash();
            check_block_sanity(&block, &self.params)?;
            if let Some(parent) = block.parents().iter().find(|p| self.dag_node(p).is_none()) {
                return Err(ChainError::Structural(format!(
                    "record {} ({}) references unknown parent {}",
                    index, hash, parent
                )));
            }
            self.maybe_accept_block(Arc::new(block), BehaviorFlags::FAST_ADD)?;
            imported += 1;
            if imported % 1000 == 0 {
                tracing::info!(imported, total = count, "importing blocks");
            }
        }
        tracing::info!(imported, "imported blocks");
        Ok(imported)
    }

    /// Import `dir`/[`IBD_FILE_NAME`].
    pub fn import_blocks_from_dir(&self, dir: &Path) -> Result<usize, ChainError> {
        let mut reader = BufReader::new(File::open(dir.join(IBD_FILE_NAME))?);
        self.import_blocks(&mut reader)
    }

    fn export_hashes(&self, order: ExportOrder, end: Option<BlockHash>) -> Result<Vec<BlockHash>, ChainError> {
        let state = self.state.read();
        let dag = state.dag.as_ref();

        let last = match (order, end) {
            (ExportOrder::ById, Some(hash)) => {
                let node = dag
                    .node(&hash)
                    .ok_or_else(|| ChainError::Structural(format!("unknown end block {}", hash)))?;
                node.id.0 as u64
            }
            (ExportOrder::ById, None) => dag.block_count().saturating_sub(1) as u64,
            (ExportOrder::ByOrder, Some(hash)) => dag
                .node(&hash)
                .and_then(|node| node.order)
                .ok_or_else(|| ChainError::Structural(format!("end block {} is not ordered", hash)))?,
            (ExportOrder::ByOrder, None) => dag.graph_state().main_order,
        };

        let mut hashes = Vec::new();
        for position in 1..=last {
            match order {
                ExportOrder::ById => {
                    let Ok(id) = u32::try_from(position) else {
                        break;
                    };
                    match dag.node_by_id(BlockId(id)) {
                        Some(node) => hashes.push(node.hash),
                        None => tracing::debug!(id, "no block with id, skipping"),
                    }
                }
                ExportOrder::ByOrder => {
                    let hash = dag.hash_by_order(position).ok_or_else(|| {
                        ChainError::Structural(format!("no block at order {}", position))
                    })?;
                    hashes.push(hash);
                }
            }
        }
        Ok(hashes)
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, ChainError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
