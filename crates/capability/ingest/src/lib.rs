use async_trait::async_trait;
use domain::RawEvent;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS, SubscribeReasonCode};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, warn};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("handler error: {0}")]
    Handler(String),
    /// 报文未通过严格校验，采集源应停止。
    #[error("message rejected: {0}")]
    Rejected(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("source error: {0}")]
    Source(String),
}

/// RawEvent 处理器。
#[async_trait]
pub trait RawEventHandler: Send + Sync {
    async fn handle(&self, event: RawEvent) -> Result<(), IngestError>;
}

/// 采集源抽象。
#[async_trait]
pub trait Source: Send + Sync {
    async fn run(&self, handler: Arc<dyn RawEventHandler>) -> Result<(), IngestError>;
}

/// 通道源：从 mpsc 接收 RawEvent（用于接线与测试），通道关闭即结束。
pub struct ChannelSource {
    receiver: Mutex<Option<mpsc::Receiver<RawEvent>>>,
}

impl ChannelSource {
    pub fn new(receiver: mpsc::Receiver<RawEvent>) -> Self {
        Self {
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

#[async_trait]
impl Source for ChannelSource {
    async fn run(&self, handler: Arc<dyn RawEventHandler>) -> Result<(), IngestError> {
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| IngestError::Source("channel source already running".to_string()))?;
        while let Some(event) = receiver.recv().await {
            dispatch(handler.as_ref(), event).await?;
        }
        Ok(())
    }
}

/// MQTT 采集源配置。
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub qos: u8,
    pub reconnect_delay_ms: u64,
    /// 每台设备一个 topic。
    pub topics: Vec<String>,
    /// 订阅被拒绝时是否停止采集源。
    pub fail_on_subscribe_error: bool,
}

/// MQTT 采集源。
///
/// 每次（重新）连接成功后为全部 topic 发起订阅，并按 SubAck 报告订阅结果。
#[derive(Debug, Clone)]
pub struct MqttSource {
    config: MqttSourceConfig,
}

impl MqttSource {
    pub fn new(config: MqttSourceConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> MqttOptions {
        let client_id = self
            .config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("oee-bridge-{}", uuid::Uuid::new_v4()));
        let mut options = MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        if let Some((username, password)) = self.credentials() {
            options.set_credentials(username, password);
        }
        options
    }

    /// 只配置用户名时以空口令登录。
    fn credentials(&self) -> Option<(String, String)> {
        let username = self.config.username.clone()?;
        let password = self.config.password.clone().unwrap_or_default();
        Some((username, password))
    }

    fn subscribe_failed(&self, topic: &str, reason: &str) -> Result<(), IngestError> {
        error!(target: "oee.ingest", topic = %topic, reason = %reason, "mqtt_subscribe_failed");
        if self.config.fail_on_subscribe_error {
            return Err(IngestError::Subscribe(format!("{}: {}", topic, reason)));
        }
        Ok(())
    }
}

#[async_trait]
impl Source for MqttSource {
    async fn run(&self, handler: Arc<dyn RawEventHandler>) -> Result<(), IngestError> {
        let qos = qos_from_u8(self.config.qos);
        let capacity = self.config.topics.len() + 10;
        let (client, mut eventloop) = AsyncClient::new(self.options(), capacity);
        let mut tracker = SubscriptionTracker::default();
        let reconnect_delay = Duration::from_millis(self.config.reconnect_delay_ms);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(
                        target: "oee.ingest",
                        host = %self.config.host,
                        port = self.config.port,
                        topics = self.config.topics.len(),
                        "mqtt_connected"
                    );
                    for topic in tracker.reconnected(&self.config.topics) {
                        match client.try_subscribe(topic.clone(), qos) {
                            Ok(()) => tracker.queued(topic),
                            Err(err) => self.subscribe_failed(&topic, &err.to_string())?,
                        }
                    }
                }
                Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => tracker.sent(pkid),
                Ok(Event::Incoming(Packet::SubAck(suback))) => {
                    for (topic, granted) in tracker.acked(suback.pkid, &suback.return_codes) {
                        if granted {
                            info!(target: "oee.ingest", topic = %topic, "mqtt_subscribed");
                        } else {
                            self.subscribe_failed(&topic, "rejected by broker")?;
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let event = RawEvent {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                        received_at_ms: now_epoch_ms(),
                    };
                    dispatch(handler.as_ref(), event).await?;
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    info!(target: "oee.ingest", "mqtt_disconnected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(target: "oee.ingest", error = %err, "mqtt_eventloop_error");
                    info!(
                        target: "oee.ingest",
                        delay_ms = self.config.reconnect_delay_ms,
                        "mqtt_reconnecting"
                    );
                    tokio::time::sleep(reconnect_delay).await;
                }
            }
        }
    }
}

/// 交给处理器；`Rejected` 会终止采集源，其余错误只记录日志。
async fn dispatch(handler: &dyn RawEventHandler, event: RawEvent) -> Result<(), IngestError> {
    match handler.handle(event).await {
        Ok(()) => Ok(()),
        Err(err @ IngestError::Rejected(_)) => Err(err),
        Err(err) => {
            warn!(target: "oee.ingest", error = %err, "raw_event_handler_failed");
            Ok(())
        }
    }
}

/// 订阅请求 → pkid → SubAck 的对应关系。
///
/// 请求通道按发起顺序出站，`Outgoing::Subscribe` 只带 pkid，
/// 因此出站的 pkid 依次对应 `queued` 队首的 topic。
/// 断线时仍留在通道里的请求会在重连后发出，它们的 topic 保留在队列中且不重复发起。
#[derive(Debug, Default)]
struct SubscriptionTracker {
    queued: VecDeque<String>,
    in_flight: HashMap<u16, String>,
}

impl SubscriptionTracker {
    /// 连接建立后需要重新发起订阅的 topic。
    ///
    /// 已出站但未确认的订阅随旧连接失效；仍在通道中排队的订阅会在新连接上发出。
    fn reconnected(&mut self, topics: &[String]) -> Vec<String> {
        self.in_flight.clear();
        topics
            .iter()
            .filter(|topic| !self.queued.contains(topic))
            .cloned()
            .collect()
    }

    fn queued(&mut self, topic: String) {
        self.queued.push_back(topic);
    }

    fn sent(&mut self, pkid: u16) {
        if let Some(topic) = self.queued.pop_front() {
            self.in_flight.insert(pkid, topic);
        }
    }

    fn acked(&mut self, pkid: u16, codes: &[SubscribeReasonCode]) -> Vec<(String, bool)> {
        let Some(topic) = self.in_flight.remove(&pkid) else {
            return Vec::new();
        };
        let granted = !codes.is_empty()
            && codes
                .iter()
                .all(|code| matches!(code, SubscribeReasonCode::Success(_)));
        vec![(topic, granted)]
    }
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
