//! 富内容加载
//!
//! HTML 标签和多帧的内容由外部加载器异步准备。绘制时在单次渲染调用内
//! 创建一个单线程 tokio 运行时等待加载完成，超时后使用已加载的部分内容。

use std::time::Duration;

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};

/// 内容快照
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RichContent {
    pub html: String,
    /// 是否已全部加载
    pub complete: bool,
}

/// 等待结果
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(RichContent),
    /// 超时，携带已加载的部分
    TimedOut(RichContent),
}

impl LoadOutcome {
    pub fn content(&self) -> &RichContent {
        match self {
            LoadOutcome::Loaded(c) | LoadOutcome::TimedOut(c) => c,
        }
    }

    pub fn into_content(self) -> RichContent {
        match self {
            LoadOutcome::Loaded(c) | LoadOutcome::TimedOut(c) => c,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, LoadOutcome::TimedOut(_))
    }
}

/// 一次加载任务
pub trait ContentJob {
    /// 加载完成时返回完整内容
    fn finished(&mut self) -> LocalBoxFuture<'_, RichContent>;
    /// 当前已加载的部分
    fn partial(&self) -> RichContent;
}

/// 内容加载器
pub trait ContentLoader {
    /// 以 `size`（毫米）为视口开始加载 `html`
    fn load(&self, html: &str, size: (f64, f64)) -> Box<dyn ContentJob>;
}

/// 无外部资源的加载器：内容立即可用
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContentLoader;

struct ReadyJob(RichContent);

impl ContentJob for ReadyJob {
    fn finished(&mut self) -> LocalBoxFuture<'_, RichContent> {
        future::ready(self.0.clone()).boxed_local()
    }

    fn partial(&self) -> RichContent {
        self.0.clone()
    }
}

impl ContentLoader for InlineContentLoader {
    fn load(&self, html: &str, _size: (f64, f64)) -> Box<dyn ContentJob> {
        Box::new(ReadyJob(RichContent {
            html: html.to_string(),
            complete: true,
        }))
    }
}

/// 等待加载完成，最多 `timeout`
///
/// 超时或运行时创建失败时返回部分内容，不视为错误。
pub fn wait_for_content(job: &mut dyn ContentJob, timeout: Duration) -> LoadOutcome {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!("Cannot start content loading runtime: {}", e);
            return LoadOutcome::TimedOut(job.partial());
        }
    };

    let result = runtime.block_on(async { tokio::time::timeout(timeout, job.finished()).await });
    match result {
        Ok(content) => LoadOutcome::Loaded(content),
        Err(_) => {
            tracing::warn!("Rich content did not finish loading within {:?}, rendering partial content", timeout);
            LoadOutcome::TimedOut(job.partial())
        }
    }
}
