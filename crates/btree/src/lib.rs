//! In-memory B+ tree index from row-id to page-id.
//!
//! Parameterised by minimum degree `t`: every node holds at most `2t - 1`
//! keys. Internal nodes carry routing keys only; leaves carry sorted
//! `(row_id, page_id)` pairs and are linked left-to-right so the whole
//! index can be walked without descending the tree again.
//!
//! Inserts use the CLRS top-down split: any full node encountered on the
//! descent path is split before recursing into it, so no ancestor ever
//! needs an upward cascade after the fact.

mod node;


use common::{DbResult, PageId, RowId};
use node::{Node, find_key_index};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Row-id to page-id index with split-on-insert and a leaf link chain.
#[derive(Debug)]
pub struct BPlusTree {
    t: usize,
    nodes: Vec<Node>,
    root: usize,
}

impl BPlusTree {
    /// Creates an empty tree with minimum degree `t` (`t >= 2`).
    pub fn new(t: usize) -> Self {
        assert!(t >= 2, "minimum degree must be >= 2");
        Self {
            t,
            nodes: vec![Node::new_leaf()],
            root: 0,
        }
    }

    /// Looks up the page-id for `row_id`.
    pub fn get(&self, row_id: RowId) -> Option<PageId> {
        let mut cur = self.root;
        loop {
            let node = &self.nodes[cur];
            let i = find_key_index(&node.keys, row_id.0);
            if node.leaf {
                return if i < node.keys.len() && node.keys[i] == row_id.0 {
                    Some(PageId(node.values[i] as u64))
                } else {
                    None
                };
            }
            cur = node.children[Self::descend_index(node, i, row_id.0)];
        }
    }

    /// Inserts or overwrites the page-id mapped to `row_id`.
    pub fn put(&mut self, row_id: RowId, page_id: PageId) {
        if self.get(row_id).is_some() {
            self.overwrite(row_id, page_id);
            return;
        }

        if self.nodes[self.root].is_full(self.t) {
            let old_root = self.root;
            let mut new_root = Node::new_internal();
            new_root.children.push(old_root);
            self.root = self.nodes.len();
            self.nodes.push(new_root);
            self.split_child(self.root, 0);
        }
        self.insert_nonfull(self.root, row_id.0, page_id.0 as i64);
    }

    /// Removes the entry for `row_id` from its leaf, if present.
    ///
    /// No rebalancing is performed; the leaf's remaining keys stay sorted.
    pub fn remove(&mut self, row_id: RowId) {
        let mut cur = self.root;
        loop {
            let leaf = self.nodes[cur].leaf;
            let i = find_key_index(&self.nodes[cur].keys, row_id.0);
            if leaf {
                if i < self.nodes[cur].keys.len() && self.nodes[cur].keys[i] == row_id.0 {
                    self.nodes[cur].keys.remove(i);
                    self.nodes[cur].values.remove(i);
                }
                return;
            }
            cur = self.nodes[cur].children[Self::descend_index(&self.nodes[cur], i, row_id.0)];
        }
    }

    /// All (row_id, page_id) pairs in ascending order, via recursive in-order walk.
    pub fn traverse(&self) -> Vec<(RowId, PageId)> {
        let mut out = Vec::new();
        self.traverse_node(self.root, &mut out);
        out
    }

    /// All (row_id, page_id) pairs in ascending order, via the leaf link chain.
    pub fn traverse_leaves(&self) -> Vec<(RowId, PageId)> {
        let mut out = Vec::new();
        let mut cur = self.leftmost_leaf();
        while let Some(idx) = cur {
            let node = &self.nodes[idx];
            out.extend(
                node.keys
                    .iter()
                    .zip(node.values.iter())
                    .map(|(&k, &v)| (RowId(k), PageId(v as u64))),
            );
            cur = node.next;
        }
        out
    }

    /// Writes the tree to `path` as the recursive `index.json` node schema.
    pub fn dump_to_json(&self, path: impl AsRef<Path>) -> DbResult<()> {
        let root = self.to_json_node(self.root);
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &root)?;
        Ok(())
    }

    /// Reloads a tree from an `index.json` snapshot previously written by `dump_to_json`.
    pub fn load_from_json(path: impl AsRef<Path>, t: usize) -> DbResult<Self> {
        let file = File::open(path)?;
        let root: JsonNode = serde_json::from_reader(file)?;
        let mut tree = Self { t, nodes: Vec::new(), root: 0 };
        tree.root = tree.from_json_node(&root);
        tree.relink_leaves();
        Ok(tree)
    }

    /// A routing key equal to `key` was copied up from the left leaf and is
    /// still retained there, so an exact match descends left (child `i`)
    /// just like the `keys[i] > key` case; only `find_key_index` itself
    /// distinguishes the two.
    fn descend_index(_node: &Node, i: usize, _key: i64) -> usize {
        i
    }

    fn overwrite(&mut self, row_id: RowId, page_id: PageId) {
        let mut cur = self.root;
        loop {
            let node = &mut self.nodes[cur];
            let i = find_key_index(&node.keys, row_id.0);
            if node.leaf {
                node.values[i] = page_id.0 as i64;
                return;
            }
            cur = node.children[Self::descend_index(node, i, row_id.0)];
        }
    }

    fn insert_nonfull(&mut self, node_idx: usize, key: i64, value: i64) {
        if self.nodes[node_idx].leaf {
            let pos = find_key_index(&self.nodes[node_idx].keys, key);
            self.nodes[node_idx].keys.insert(pos, key);
            self.nodes[node_idx].values.insert(pos, value);
            return;
        }

        let mut child_pos = find_key_index(&self.nodes[node_idx].keys, key);
        let child_idx = self.nodes[node_idx].children[child_pos];
        if self.nodes[child_idx].is_full(self.t) {
            self.split_child(node_idx, child_pos);
            if key >= self.nodes[node_idx].keys[child_pos] {
                child_pos += 1;
            }
        }
        let child_idx = self.nodes[node_idx].children[child_pos];
        self.insert_nonfull(child_idx, key, value);
    }

    /// Splits `parent.children[child_pos]`, which must be full.
    fn split_child(&mut self, parent_idx: usize, child_pos: usize) {
        let t = self.t;
        let child_idx = self.nodes[parent_idx].children[child_pos];

        if self.nodes[child_idx].leaf {
            let right_keys = self.nodes[child_idx].keys.split_off(t);
            let right_values = self.nodes[child_idx].values.split_off(t);
            let median = *self.nodes[child_idx].keys.last().expect("leaf split point is non-empty");
            let old_next = self.nodes[child_idx].next;

            let mut right = Node::new_leaf();
            right.keys = right_keys;
            right.values = right_values;
            right.next = old_next;
            let right_idx = self.nodes.len();
            self.nodes.push(right);
            self.nodes[child_idx].next = Some(right_idx);

            self.nodes[parent_idx].keys.insert(child_pos, median);
            self.nodes[parent_idx].children.insert(child_pos + 1, right_idx);
        } else {
            let median = self.nodes[child_idx].keys[t - 1];
            let right_keys = self.nodes[child_idx].keys.split_off(t);
            let right_children = self.nodes[child_idx].children.split_off(t);
            self.nodes[child_idx].keys.pop(); // remove the promoted median from the left child

            let mut right = Node::new_internal();
            right.keys = right_keys;
            right.children = right_children;
            let right_idx = self.nodes.len();
            self.nodes.push(right);

            self.nodes[parent_idx].keys.insert(child_pos, median);
            self.nodes[parent_idx].children.insert(child_pos + 1, right_idx);
        }
    }

    fn traverse_node(&self, idx: usize, out: &mut Vec<(RowId, PageId)>) {
        let node = &self.nodes[idx];
        if node.leaf {
            out.extend(
                node.keys
                    .iter()
                    .zip(node.values.iter())
                    .map(|(&k, &v)| (RowId(k), PageId(v as u64))),
            );
        } else {
            for &child in &node.children {
                self.traverse_node(child, out);
            }
        }
    }

    fn leftmost_leaf(&self) -> Option<usize> {
        let mut cur = self.root;
        loop {
            let node = &self.nodes[cur];
            if node.leaf {
                return Some(cur);
            }
            cur = *node.children.first()?;
        }
    }

    fn to_json_node(&self, idx: usize) -> JsonNode {
        let node = &self.nodes[idx];
        JsonNode {
            keys: node.keys.clone(),
            values: node.values.clone(),
            leaf: node.leaf,
            children: if node.leaf {
                None
            } else {
                Some(node.children.iter().map(|&c| self.to_json_node(c)).collect())
            },
        }
    }

    fn from_json_node(&mut self, json: &JsonNode) -> usize {
        if json.leaf {
            let node = Node {
                keys: json.keys.clone(),
                values: json.values.clone(),
                children: Vec::new(),
                leaf: true,
                next: None,
            };
            self.nodes.push(node);
            self.nodes.len() - 1
        } else {
            let children: Vec<usize> = json
                .children
                .as_ref()
                .expect("internal node carries children in the index schema")
                .iter()
                .map(|c| self.from_json_node(c))
                .collect();
            let node = Node {
                keys: json.keys.clone(),
                values: Vec::new(),
                children,
                leaf: false,
                next: None,
            };
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    /// Re-threads leaf `next` links left-to-right after a fresh load.
    fn relink_leaves(&mut self) {
        let mut leaves = Vec::new();
        self.collect_leaves(self.root, &mut leaves);
        for pair in leaves.windows(2) {
            self.nodes[pair[0]].next = Some(pair[1]);
        }
    }

    fn collect_leaves(&self, idx: usize, out: &mut Vec<usize>) {
        let node = &self.nodes[idx];
        if node.leaf {
            out.push(idx);
        } else {
            for &child in &node.children {
                self.collect_leaves(child, out);
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct JsonNode {
    keys: Vec<i64>,
    values: Vec<i64>,
    leaf: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<JsonNode>>,
}
