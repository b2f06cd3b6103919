//! Z 序登记表
//!
//! 按从底到顶的顺序保存非纸张图元。名次由序列位置决定，不单独存储；
//! 场景在每次变动后把名次写回图元的 `z_value`。

use crate::item::ItemId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZOrderList {
    items: Vec<ItemId>,
}

impl ZOrderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains(&id)
    }

    /// 从底到顶
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = ItemId> + '_ {
        self.items.iter().copied()
    }

    pub fn as_slice(&self) -> &[ItemId] {
        &self.items
    }

    /// 名次（0 为最底层）
    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|i| *i == id)
    }

    /// 放到最顶层，已存在时返回 false
    pub fn add(&mut self, id: ItemId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.items.push(id);
        true
    }

    /// 插入到指定名次，越界时放到顶层
    pub fn insert(&mut self, index: usize, id: ItemId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.items.insert(index.min(self.items.len()), id);
        true
    }

    pub fn remove(&mut self, id: ItemId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// 与上方相邻项交换，已在顶层时不变
    pub fn raise(&mut self, id: ItemId) -> bool {
        match self.position(id) {
            Some(index) if index + 1 < self.items.len() => {
                self.items.swap(index, index + 1);
                true
            }
            _ => false,
        }
    }

    /// 与下方相邻项交换，已在底层时不变
    pub fn lower(&mut self, id: ItemId) -> bool {
        match self.position(id) {
            Some(index) if index > 0 => {
                self.items.swap(index, index - 1);
                true
            }
            _ => false,
        }
    }

    pub fn move_to_top(&mut self, id: ItemId) -> bool {
        match self.position(id) {
            Some(index) if index + 1 < self.items.len() => {
                let id = self.items.remove(index);
                self.items.push(id);
                true
            }
            _ => false,
        }
    }

    pub fn move_to_bottom(&mut self, id: ItemId) -> bool {
        match self.position(id) {
            Some(index) if index > 0 => {
                let id = self.items.remove(index);
                self.items.insert(0, id);
                true
            }
            _ => false,
        }
    }

    /// 紧邻的下一层
    pub fn below(&self, id: ItemId) -> Option<ItemId> {
        let index = self.position(id)?;
        index.checked_sub(1).map(|i| self.items[i])
    }

    /// 紧邻的上一层
    pub fn above(&self, id: ItemId) -> Option<ItemId> {
        let index = self.position(id)?;
        self.items.get(index + 1).copied()
    }

    /// 按给定 Z 值重建，Z 值相同按 ItemId（即插入顺序）
    pub fn rebuild(&mut self, entries: impl IntoIterator<Item = (ItemId, f64)>) {
        let mut entries: Vec<(ItemId, f64)> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        self.items = entries.into_iter().map(|(id, _)| id).collect();
    }

    /// 每项的 Z 值：名次 + 1（纸张占 0）
    pub fn z_values(&self) -> impl Iterator<Item = (ItemId, f64)> + '_ {
        self.items
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, (index + 1) as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[u64]) -> ZOrderList {
        let mut z = ZOrderList::new();
        for id in ids {
            z.add(ItemId(*id));
        }
        z
    }

    fn ids(z: &ZOrderList) -> Vec<u64> {
        z.iter().map(|i| i.0).collect()
    }

    #[test]
    fn test_add_is_injective() {
        let mut z = list(&[1, 2, 3]);
        assert!(!z.add(ItemId(2)));
        assert_eq!(ids(&z), vec![1, 2, 3]);
        assert!(z.remove(ItemId(2)));
        assert!(!z.remove(ItemId(2)));
        assert_eq!(ids(&z), vec![1, 3]);
    }

    #[test]
    fn test_insert_at_rank() {
        let mut z = list(&[1, 2, 3]);
        assert!(z.insert(1, ItemId(4)));
        assert_eq!(ids(&z), vec![1, 4, 2, 3]);
        assert!(!z.insert(0, ItemId(2)));
        assert!(z.insert(99, ItemId(5)));
        assert_eq!(ids(&z), vec![1, 4, 2, 3, 5]);
    }

    #[test]
    fn test_raise_then_lower_restores_order() {
        let mut z = list(&[1, 2, 3, 4]);
        let before = z.clone();
        assert!(z.raise(ItemId(2)));
        assert_eq!(ids(&z), vec![1, 3, 2, 4]);
        assert!(z.lower(ItemId(2)));
        assert_eq!(z, before);
    }

    #[test]
    fn test_boundaries_are_noops() {
        let mut z = list(&[1, 2, 3]);
        assert!(!z.raise(ItemId(3)));
        assert!(!z.lower(ItemId(1)));
        assert!(!z.move_to_top(ItemId(3)));
        assert!(!z.move_to_bottom(ItemId(1)));
        assert!(!z.raise(ItemId(9)));
        assert_eq!(z.above(ItemId(3)), None);
        assert_eq!(z.below(ItemId(1)), None);
        assert_eq!(ids(&z), vec![1, 2, 3]);
    }

    #[test]
    fn test_move_to_top_and_bottom() {
        let mut z = list(&[1, 2, 3, 4]);
        z.move_to_top(ItemId(1));
        assert_eq!(ids(&z), vec![2, 3, 4, 1]);
        z.move_to_bottom(ItemId(4));
        assert_eq!(ids(&z), vec![4, 2, 3, 1]);
        assert_eq!(z.below(ItemId(3)), Some(ItemId(2)));
        assert_eq!(z.above(ItemId(3)), Some(ItemId(1)));
    }

    #[test]
    fn test_rebuild_breaks_ties_by_insertion() {
        let mut z = ZOrderList::new();
        z.rebuild(vec![
            (ItemId(5), 2.0),
            (ItemId(3), 1.0),
            (ItemId(4), 2.0),
            (ItemId(1), 7.0),
        ]);
        assert_eq!(ids(&z), vec![3, 4, 5, 1]);
        let zs: Vec<f64> = z.z_values().map(|(_, v)| v).collect();
        assert_eq!(zs, vec![1.0, 2.0, 3.0, 4.0]);
    }
}
