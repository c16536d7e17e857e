use sha2::{Digest, Sha256};

pub const MAX_CHUNK_SIZE: usize = 256 * 1024;
pub const MIN_CHUNK_SIZE: usize = 32 * 1024;
const NOTE_SIZE: usize = 32;

/// One span of the uploaded data and the hash of its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data_hash: [u8; 32],
    pub min_byte_range: usize,
    pub max_byte_range: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.max_byte_range - self.min_byte_range
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Inclusion proof for one chunk. `offset` is the last byte the chunk covers.
#[derive(Debug, Clone)]
pub struct Proof {
    pub offset: usize,
    pub proof: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkedData {
    pub data_root: [u8; 32],
    pub chunks: Vec<Chunk>,
    pub proofs: Vec<Proof>,
}

enum Node {
    Leaf {
        id: [u8; 32],
        data_hash: [u8; 32],
        max_byte_range: usize,
    },
    Branch {
        id: [u8; 32],
        byte_range: usize,
        max_byte_range: usize,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn id(&self) -> [u8; 32] {
        match self {
            Node::Leaf { id, .. } | Node::Branch { id, .. } => *id,
        }
    }

    fn max_byte_range(&self) -> usize {
        match self {
            Node::Leaf { max_byte_range, .. } | Node::Branch { max_byte_range, .. } => *max_byte_range,
        }
    }
}

pub(crate) fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// 32-byte big-endian offset.
pub(crate) fn note(value: usize) -> [u8; NOTE_SIZE] {
    let mut buf = [0u8; NOTE_SIZE];
    buf[NOTE_SIZE - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    buf
}

/// Splits data into chunks of at most `MAX_CHUNK_SIZE`. When the tail after a
/// full chunk would be smaller than `MIN_CHUNK_SIZE`, the last two chunks are
/// split evenly instead. The final chunk may be empty.
pub fn chunk_data(data: &[u8]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut rest = data;
    let mut cursor = 0;

    while rest.len() >= MAX_CHUNK_SIZE {
        let mut size = MAX_CHUNK_SIZE;
        let next = rest.len() - MAX_CHUNK_SIZE;
        if next > 0 && next < MIN_CHUNK_SIZE {
            size = rest.len().div_ceil(2);
        }
        let (chunk, tail) = rest.split_at(size);
        chunks.push(Chunk {
            data_hash: sha256(&[chunk]),
            min_byte_range: cursor,
            max_byte_range: cursor + size,
        });
        cursor += size;
        rest = tail;
    }

    chunks.push(Chunk {
        data_hash: sha256(&[rest]),
        min_byte_range: cursor,
        max_byte_range: cursor + rest.len(),
    });
    chunks
}

fn leaf(chunk: &Chunk) -> Node {
    Node::Leaf {
        id: sha256(&[&sha256(&[&chunk.data_hash]), &sha256(&[&note(chunk.max_byte_range)])]),
        data_hash: chunk.data_hash,
        max_byte_range: chunk.max_byte_range,
    }
}

fn branch(left: Node, right: Node) -> Node {
    let byte_range = left.max_byte_range();
    Node::Branch {
        id: sha256(&[
            &sha256(&[&left.id()]),
            &sha256(&[&right.id()]),
            &sha256(&[&note(byte_range)]),
        ]),
        byte_range,
        max_byte_range: right.max_byte_range(),
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn build_root(mut layer: Vec<Node>) -> Option<Node> {
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        let mut nodes = layer.into_iter();
        while let Some(left) = nodes.next() {
            // an odd node moves up unchanged
            next.push(match nodes.next() {
                Some(right) => branch(left, right),
                None => left,
            });
        }
        layer = next;
    }
    layer.pop()
}

fn resolve_proofs(node: &Node, mut path: Vec<u8>, out: &mut Vec<Proof>) {
    match node {
        Node::Leaf {
            data_hash,
            max_byte_range,
            ..
        } => {
            path.extend_from_slice(data_hash);
            path.extend_from_slice(&note(*max_byte_range));
            out.push(Proof {
                offset: max_byte_range.saturating_sub(1),
                proof: path,
            });
        }
        Node::Branch {
            byte_range,
            left,
            right,
            ..
        } => {
            path.extend_from_slice(&left.id());
            path.extend_from_slice(&right.id());
            path.extend_from_slice(&note(*byte_range));
            resolve_proofs(left, path.clone(), out);
            resolve_proofs(right, path, out);
        }
    }
}

/// Chunks the data, computes its Merkle root and one proof per chunk. A
/// trailing empty chunk counts toward the root but is never sent.
pub fn prepare_chunks(data: &[u8]) -> ChunkedData {
    let mut chunks = chunk_data(data);
    let Some(root) = build_root(chunks.iter().map(leaf).collect()) else {
        return ChunkedData::default();
    };
    let mut proofs = Vec::with_capacity(chunks.len());
    resolve_proofs(&root, Vec::new(), &mut proofs);

    if !data.is_empty() && chunks.last().is_some_and(Chunk::is_empty) {
        chunks.pop();
        proofs.pop();
    }
    ChunkedData {
        data_root: root.id(),
        chunks,
        proofs,
    }
}
