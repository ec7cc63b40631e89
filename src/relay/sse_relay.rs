//! SSE 转发器
//!
//! 每个流对应一个后台任务：从推理服务拉取片段，经有界通道交给客户端连接。
//! 任务在结束、出错、超时或客户端断开时退出，退出前取消上游请求并释放会话租约。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::types::{RelayError, RelayEvent, RelayState};
use crate::config::StreamConfig;
use crate::providers::ChunkStream;
use crate::session::SessionLease;

type RelayItem = Result<RelayEvent, RelayError>;

pub struct SseRelay {
    timeout: Duration,
    channel_capacity: usize,
    keep_alive: Duration,
    permits: Arc<Semaphore>,
}

/// 一个进行中的流
pub struct RelayHandle {
    /// 客户端侧的事件接收端，drop 即视为客户端断开
    events: mpsc::Receiver<RelayItem>,
    /// 终止错误单独投递，不占事件通道的容量
    failure: oneshot::Receiver<RelayError>,
    pub state: watch::Receiver<RelayState>,
    /// 任务结束时返回终态
    pub task: JoinHandle<RelayState>,
}

impl RelayHandle {
    /// 读取下一项；事件通道关闭后再交出终止错误（如果有）
    pub async fn recv(&mut self) -> Option<RelayItem> {
        if let Some(item) = self.events.recv().await {
            return Some(item);
        }
        self.failure.try_recv().ok().map(Err)
    }

    /// 放弃读取（等同客户端断开），只保留任务句柄
    pub fn detach(self) -> JoinHandle<RelayState> {
        self.task
    }
}

impl SseRelay {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            timeout: config.timeout(),
            channel_capacity: config.channel_capacity.max(1),
            keep_alive: config.keep_alive_interval(),
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
        }
    }

    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// 占用一个流名额，没有空闲名额时立即失败
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, RelayError> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| RelayError::Busy)
    }

    /// 启动转发任务
    ///
    /// `producer` 拿到取消令牌后建立上游流；令牌在任务进入任一终态时被取消。
    pub fn start<F, Fut>(
        &self,
        permit: OwnedSemaphorePermit,
        lease: Option<SessionLease>,
        producer: F,
    ) -> RelayHandle
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<ChunkStream, RelayError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let (failure_tx, failure_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(RelayState::Idle);
        let timeout = self.timeout;

        let task = tokio::spawn(async move {
            let label = lease
                .as_ref()
                .map(|l| l.session_id().to_string())
                .unwrap_or_else(|| "-".to_string());
            let cancel = CancellationToken::new();
            let guard = cancel.clone().drop_guard();

            state_tx.send_replace(RelayState::Streaming);
            tracing::debug!("[SSE] 开始转发: {}", label);

            let outcome = tokio::time::timeout(timeout, forward(&tx, producer(cancel))).await;
            let state = match outcome {
                Ok(Ok(())) => {
                    tracing::info!("[SSE] 转发完成: {}", label);
                    RelayState::Completed
                }
                Ok(Err(err)) => {
                    tracing::warn!("[SSE] 转发失败: {} - {}", label, err);
                    let _ = failure_tx.send(err);
                    RelayState::Errored
                }
                Err(_) => {
                    tracing::warn!("[SSE] 转发超时: {} ({:?})", label, timeout);
                    let _ = failure_tx.send(RelayError::TimedOut);
                    RelayState::TimedOut
                }
            };

            // 顺序：取消上游，移除会话，最后关闭通道
            drop(guard);
            drop(lease);
            state_tx.send_replace(state);
            drop(tx);
            drop(permit);
            state
        });

        RelayHandle {
            events: rx,
            failure: failure_rx,
            state: state_rx,
            task,
        }
    }

    /// 把转发任务包装成 SSE 响应
    pub fn into_sse(
        &self,
        mut handle: RelayHandle,
    ) -> Sse<impl Stream<Item = Result<Event, RelayError>>> {
        let stream = async_stream::stream! {
            while let Some(item) = handle.recv().await {
                yield item.map(RelayEvent::into_event);
            }
        };
        Sse::new(stream).keep_alive(KeepAlive::new().interval(self.keep_alive))
    }
}

async fn forward<Fut>(tx: &mpsc::Sender<RelayItem>, upstream: Fut) -> Result<(), RelayError>
where
    Fut: Future<Output = Result<ChunkStream, RelayError>>,
{
    let mut stream = tokio::select! {
        stream = upstream => stream?,
        _ = tx.closed() => return Err(RelayError::ClientGone),
    };

    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = tx.closed() => return Err(RelayError::ClientGone),
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => return Err(err.into()),
            None => return Err(RelayError::UpstreamClosed),
        };

        if let Some(text) = chunk.content().filter(|t| !t.is_empty()) {
            send(tx, RelayEvent::Message(text.to_string())).await?;
        }
        if chunk.done {
            send(tx, RelayEvent::Complete).await?;
            return Ok(());
        }
    }
}

async fn send(tx: &mpsc::Sender<RelayItem>, event: RelayEvent) -> Result<(), RelayError> {
    tx.send(Ok(event)).await.map_err(|_| RelayError::ClientGone)
}
