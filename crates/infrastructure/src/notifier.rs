use async_trait::async_trait;
use macct_domain::events::{EventNotifier, JobEvent};
use macct_errors::DispatchResult;
use tokio::sync::broadcast;
use tracing::debug;

/// 基于广播通道的进程内事件通知器。
///
/// 没有订阅者时发送会失败，这属于正常情况（例如服务刚启动），
/// 因此发送失败只记录日志不返回错误。
pub struct BroadcastEventNotifier {
    sender: broadcast::Sender<JobEvent>,
}

impl BroadcastEventNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventNotifier for BroadcastEventNotifier {
    async fn publish(&self, event: &JobEvent) -> DispatchResult<()> {
        match self.sender.send(event.clone()) {
            Ok(receivers) => {
                debug!(
                    event_type = event.event_type(),
                    receivers, "事件已广播"
                );
            }
            Err(_) => {
                debug!(event_type = event.event_type(), "无订阅者, 事件被丢弃");
            }
        }
        Ok(())
    }
}
