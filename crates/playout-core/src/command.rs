//! 撤销命令
//!
//! 每条命令保存对象在一次逻辑操作前后的完整状态快照。
//! 记录过程是一个小状态机：
//!
//! ```text
//! Idle --begin--> Recording --end/cancel--> Idle
//! ```
//!
//! 图元与多帧各有一条独立的记录流，每条流同一时刻最多一条未完成记录。

use crate::error::CommandError;
use crate::item::{Item, ItemId};
use crate::multiframe::{MultiFrame, MultiFrameId};

/// 合并上下文
///
/// 连续两条针对同一对象、上下文相同（且不是 `Unknown`）的命令合并为一条，
/// 例如拖动过程中的多次移动。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MergeContext {
    #[default]
    Unknown,
    ItemMove,
    ItemResize,
    ItemRotation,
    ItemTransparency,
    ItemOutlineWidth,
    ItemBackground,
    LabelText,
    LabelFont,
    LabelMargin,
    LabelAlignment,
    ShapeOutlineWidth,
    ArrowHeadWidth,
    MapExtent,
    MultiFrameHtml,
}

impl MergeContext {
    pub fn is_mergeable(&self) -> bool {
        *self != MergeContext::Unknown
    }
}

/// 增删命令的方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddRemoveState {
    Added,
    Removed,
}

/// 帧在所属多帧中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    pub multi_frame: MultiFrameId,
    pub index: usize,
}

/// 命令作用的对象集合（场景实现）
pub trait CommandTarget {
    /// 用快照覆盖图元状态
    fn restore_item(&mut self, id: ItemId, state: &Item) -> Result<(), CommandError>;
    /// 以指定键重新插入图元
    fn insert_item(&mut self, id: ItemId, item: Item, slot: Option<FrameSlot>);
    /// 删除图元，不产生新的命令
    fn discard_item(&mut self, id: ItemId) -> Result<(), CommandError>;
    /// 重新指定世界文件地图
    fn restore_world_file_map(&mut self, id: ItemId);
    fn restore_multi_frame(&mut self, id: MultiFrameId, state: &MultiFrame) -> Result<(), CommandError>;
}

/// 可撤销命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 单个图元的状态变化
    Item {
        id: ItemId,
        before: Box<Item>,
        after: Box<Item>,
        text: String,
        context: MergeContext,
    },
    /// 图元的添加或删除
    AddRemove {
        id: ItemId,
        item: Box<Item>,
        state: AddRemoveState,
        slot: Option<FrameSlot>,
        /// 该图元是否为世界文件地图
        world_file_map: bool,
        text: String,
    },
    /// 多帧对象的状态变化
    MultiFrame {
        id: MultiFrameId,
        before: Box<MultiFrame>,
        after: Box<MultiFrame>,
        text: String,
        context: MergeContext,
    },
    /// 作为一步撤销的一组命令
    Group { text: String, commands: Vec<Command> },
}

impl Command {
    pub fn text(&self) -> &str {
        match self {
            Command::Item { text, .. }
            | Command::AddRemove { text, .. }
            | Command::MultiFrame { text, .. }
            | Command::Group { text, .. } => text,
        }
    }

    pub fn undo(&self, target: &mut dyn CommandTarget) -> Result<(), CommandError> {
        match self {
            Command::Item { id, before, .. } => target.restore_item(*id, before),
            Command::AddRemove { state, .. } => match state {
                AddRemoveState::Added => self.discard(target),
                AddRemoveState::Removed => {
                    self.reinsert(target);
                    Ok(())
                }
            },
            Command::MultiFrame { id, before, .. } => target.restore_multi_frame(*id, before),
            Command::Group { commands, .. } => {
                for (index, command) in commands.iter().enumerate().rev() {
                    if let Err(e) = command.undo(target) {
                        // 失败时重新执行已撤销的部分，整组要么全做要么不做
                        for done in &commands[index + 1..] {
                            if let Err(rollback) = done.redo(target) {
                                tracing::warn!("Cannot roll back '{}': {}", done.text(), rollback);
                            }
                        }
                        return Err(e);
                    }
                }
                Ok(())
            }
        }
    }

    pub fn redo(&self, target: &mut dyn CommandTarget) -> Result<(), CommandError> {
        match self {
            Command::Item { id, after, .. } => target.restore_item(*id, after),
            Command::AddRemove { state, .. } => match state {
                AddRemoveState::Added => {
                    self.reinsert(target);
                    Ok(())
                }
                AddRemoveState::Removed => self.discard(target),
            },
            Command::MultiFrame { id, after, .. } => target.restore_multi_frame(*id, after),
            Command::Group { commands, .. } => {
                for (index, command) in commands.iter().enumerate() {
                    if let Err(e) = command.redo(target) {
                        for done in commands[..index].iter().rev() {
                            if let Err(rollback) = done.undo(target) {
                                tracing::warn!("Cannot roll back '{}': {}", done.text(), rollback);
                            }
                        }
                        return Err(e);
                    }
                }
                Ok(())
            }
        }
    }

    fn reinsert(&self, target: &mut dyn CommandTarget) {
        if let Command::AddRemove {
            id,
            item,
            slot,
            world_file_map,
            ..
        } = self
        {
            target.insert_item(*id, item.as_ref().clone(), *slot);
            if *world_file_map {
                target.restore_world_file_map(*id);
            }
        }
    }

    fn discard(&self, target: &mut dyn CommandTarget) -> Result<(), CommandError> {
        match self {
            Command::AddRemove { id, .. } => target.discard_item(*id),
            _ => Ok(()),
        }
    }

    /// 尝试把 `next` 合并进自身
    fn merge(&mut self, next: &Command) -> bool {
        match (self, next) {
            (
                Command::Item { id, after, context, .. },
                Command::Item {
                    id: next_id,
                    after: next_after,
                    context: next_context,
                    ..
                },
            ) if id == next_id && context == next_context && context.is_mergeable() => {
                *after = next_after.clone();
                true
            }
            (
                Command::MultiFrame { id, after, context, .. },
                Command::MultiFrame {
                    id: next_id,
                    after: next_after,
                    context: next_context,
                    ..
                },
            ) if id == next_id && context == next_context && context.is_mergeable() => {
                *after = next_after.clone();
                true
            }
            _ => false,
        }
    }
}

/// 一条未完成的记录
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand<K, S> {
    pub key: K,
    pub before: S,
    pub text: String,
    pub context: MergeContext,
}

/// 单条记录流
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecorder<K, S> {
    pending: Option<PendingCommand<K, S>>,
}

impl<K, S> Default for CommandRecorder<K, S> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<K: Copy, S> CommandRecorder<K, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.pending.is_some()
    }

    /// 正在记录的对象
    pub fn key(&self) -> Option<K> {
        self.pending.as_ref().map(|p| p.key)
    }

    pub fn begin(&mut self, key: K, before: S, text: impl Into<String>, context: MergeContext) -> Result<(), CommandError> {
        if self.pending.is_some() {
            return Err(CommandError::AlreadyRecording);
        }
        self.pending = Some(PendingCommand {
            key,
            before,
            text: text.into(),
            context,
        });
        Ok(())
    }

    /// 结束记录，取出前状态
    pub fn finish(&mut self) -> Result<PendingCommand<K, S>, CommandError> {
        self.pending.take().ok_or(CommandError::NotRecording)
    }

    /// 丢弃记录，取出前状态供回滚
    pub fn cancel(&mut self) -> Option<PendingCommand<K, S>> {
        self.pending.take()
    }
}

impl PendingCommand<ItemId, Item> {
    /// 前后状态相同时返回 None
    pub fn into_command(self, after: Item) -> Option<Command> {
        if self.before == after {
            return None;
        }
        Some(Command::Item {
            id: self.key,
            before: Box::new(self.before),
            after: Box::new(after),
            text: self.text,
            context: self.context,
        })
    }
}

impl PendingCommand<MultiFrameId, MultiFrame> {
    pub fn into_command(self, after: MultiFrame) -> Option<Command> {
        if self.before == after {
            return None;
        }
        Some(Command::MultiFrame {
            id: self.key,
            before: Box::new(self.before),
            after: Box::new(after),
            text: self.text,
            context: self.context,
        })
    }
}

/// 撤销栈
///
/// `index` 之前的命令已执行；撤销后再压入新命令会丢弃可重做部分。
/// 不设容量上限。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UndoStack {
    commands: Vec<Command>,
    index: usize,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// 压入已执行的命令，可合并时与栈顶合并
    pub fn push(&mut self, command: Command) {
        self.commands.truncate(self.index);
        if let Some(last) = self.commands.last_mut() {
            if last.merge(&command) {
                return;
            }
        }
        self.commands.push(command);
        self.index = self.commands.len();
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index < self.commands.len()
    }

    pub fn undo_text(&self) -> Option<&str> {
        self.index.checked_sub(1).map(|i| self.commands[i].text())
    }

    pub fn redo_text(&self) -> Option<&str> {
        self.commands.get(self.index).map(Command::text)
    }

    /// 撤销一步，无可撤销时返回 false
    pub fn undo(&mut self, target: &mut dyn CommandTarget) -> Result<bool, CommandError> {
        if !self.can_undo() {
            return Ok(false);
        }
        self.commands[self.index - 1].undo(target)?;
        self.index -= 1;
        Ok(true)
    }

    pub fn redo(&mut self, target: &mut dyn CommandTarget) -> Result<bool, CommandError> {
        if !self.can_redo() {
            return Ok(false);
        }
        self.commands[self.index].redo(target)?;
        self.index += 1;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.index = 0;
    }
}
