use primitive_types::U256;
use sha2::{Digest, Sha256};

use crate::error_handling::AuxPowError;
use crate::types::FoundBlock;

pub const HEADER_LEN: usize = 80;

pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

pub fn u256_to_le_bytes(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_little_endian(&mut out);
    out
}

/// 64-char big-endian hex, the form `getauxblock` expects the aux hash in.
pub fn aux_hash_hex(hash: U256) -> String {
    let mut out = [0u8; 32];
    hash.to_big_endian(&mut out);
    hex::encode(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleLink {
    pub branch: Vec<[u8; 32]>,
    pub index: u32,
}

impl MerkleLink {
    fn write(&self, out: &mut Vec<u8>) {
        write_compact_size(out, self.branch.len() as u64);
        for hash in &self.branch {
            out.extend_from_slice(hash);
        }
        out.extend_from_slice(&(self.index as i32).to_le_bytes());
    }
}

/// Sibling hashes needed to climb from `leaves[index]` to the tree root.
/// Odd levels pair their last node with itself.
pub fn calculate_merkle_link(leaves: &[[u8; 32]], index: usize) -> Result<MerkleLink, AuxPowError> {
    if leaves.is_empty() {
        return Err(AuxPowError::NoHashes);
    }
    if index >= leaves.len() {
        return Err(AuxPowError::IndexOutOfRange { index, len: leaves.len() });
    }

    let mut level = leaves.to_vec();
    let mut pos = index;
    let mut branch = Vec::new();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        branch.push(level[pos ^ 1]);
        level = level
            .chunks_exact(2)
            .map(|pair| {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&pair[0]);
                buf[32..].copy_from_slice(&pair[1]);
                sha256d(&buf)
            })
            .collect();
        pos /= 2;
    }

    Ok(MerkleLink { branch, index: index as u32 })
}

pub fn merkle_root_from_link(leaf: [u8; 32], link: &MerkleLink) -> [u8; 32] {
    let mut acc = leaf;
    let mut pos = link.index;
    for sibling in &link.branch {
        let mut buf = [0u8; 64];
        if pos & 1 == 0 {
            buf[..32].copy_from_slice(&acc);
            buf[32..].copy_from_slice(sibling);
        } else {
            buf[..32].copy_from_slice(sibling);
            buf[32..].copy_from_slice(&acc);
        }
        acc = sha256d(&buf);
        pos >>= 1;
    }
    acc
}

/// Proof that a parent-chain block commits to an aux block. Lives only for
/// the duration of one submission.
#[derive(Debug, Clone)]
pub struct AuxProofOfWork {
    pub coinbase_tx: Vec<u8>,
    pub block_header_hash: [u8; 32],
    pub coinbase_merkle_branch: MerkleLink,
    pub merged_tree_merkle_branch: MerkleLink,
    pub parent_block_header: [u8; HEADER_LEN],
}

impl AuxProofOfWork {
    pub fn build(found: &FoundBlock) -> Result<Self, AuxPowError> {
        let parent_block_header: [u8; HEADER_LEN] = found
            .header
            .as_slice()
            .try_into()
            .map_err(|_| AuxPowError::HeaderLength(found.header.len()))?;
        if found.coinbase_raw.is_empty() {
            return Err(AuxPowError::EmptyCoinbase);
        }

        let leaves: Vec<[u8; 32]> = found.work.merkle_hashes.iter().map(|h| u256_to_le_bytes(*h)).collect();
        let merged_tree_merkle_branch = calculate_merkle_link(&leaves, found.work.merkle_index)?;

        Ok(Self {
            coinbase_tx: found.coinbase_raw.clone(),
            block_header_hash: sha256d(&parent_block_header),
            coinbase_merkle_branch: MerkleLink { branch: found.coinbase_branch.clone(), index: 0 },
            merged_tree_merkle_branch,
            parent_block_header,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.coinbase_tx.len() + 32 + HEADER_LEN + 80);
        out.extend_from_slice(&self.coinbase_tx);
        out.extend_from_slice(&self.block_header_hash);
        self.coinbase_merkle_branch.write(&mut out);
        self.merged_tree_merkle_branch.write(&mut out);
        out.extend_from_slice(&self.parent_block_header);
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }
}

fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}
