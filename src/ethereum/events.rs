use alloy::{
    dyn_abi::EventExt,
    json_abi::{Event, JsonAbi},
    providers::{Provider, ProviderBuilder, WsConnect},
    rpc::types::Filter,
};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::ethereum::{codec, gateway, provider::ProviderManager, utils};

/// Retain only the most recent events per subscription, discarding oldest
/// first, so memory stays bounded regardless of append rate.
pub const EVENT_BUFFER_CAPACITY: usize = 200;

/// Fixed-capacity ring buffer over serialized event records.
#[derive(Debug)]
pub struct EventBuffer {
    items: VecDeque<Value>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Evict-on-push: the buffer never grows past its capacity.
    pub fn push(&mut self, item: Value) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot of buffered events, oldest first.
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.iter().cloned().collect()
    }
}

/// A live event subscription: a background task pushing decoded events into
/// a shared bounded buffer. Dropping via `unsubscribe` aborts the task and
/// releases the underlying RPC subscription.
#[derive(Debug)]
pub struct EventSubscription {
    pub event_name: String,
    pub contract_address: String,
    buffer: Arc<Mutex<EventBuffer>>,
    task: JoinHandle<()>,
}

impl EventSubscription {
    pub fn events(&self) -> Vec<Value> {
        self.buffer
            .lock()
            .map(|buf| buf.snapshot())
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

/// Tracks live subscriptions by generated id.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    subscriptions: HashMap<String, EventSubscription>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a WebSocket subscription for one event of a contract.
    ///
    /// Filter arguments are optional; present values must already be encoded
    /// by the codec and are applied as indexed-topic filters. Returns the
    /// subscription id.
    pub async fn subscribe(
        &mut self,
        providers: &ProviderManager,
        chain: &str,
        contract_address: &str,
        abi: &JsonAbi,
        event_name: &str,
        filter_args: &HashMap<String, Value>,
    ) -> Result<String, AppError> {
        let address = utils::validate_address(contract_address)
            .map_err(|_| AppError::InvalidAddressFormat)?;
        let event = find_event(abi, event_name)?;

        let ws_url = providers
            .get_ws_url(Some(chain))
            .map_err(|e| AppError::gateway(e.to_string()))?;

        let mut filter = Filter::new()
            .address(address)
            .event_signature(event.selector());
        filter = apply_topic_filters(filter, event, filter_args)?;

        let provider = ProviderBuilder::new()
            .on_ws(WsConnect::new(ws_url))
            .await
            .map_err(|e| AppError::gateway(utils::interpret_rpc_error(&e.to_string())))?;

        let subscription = provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| AppError::gateway(utils::interpret_rpc_error(&e.to_string())))?;

        let buffer = Arc::new(Mutex::new(EventBuffer::new(EVENT_BUFFER_CAPACITY)));
        let task_buffer = Arc::clone(&buffer);
        let task_event = event.clone();
        let task_name = event_name.to_string();

        let task = tokio::spawn(async move {
            // Provider and subscription live inside the task; aborting it
            // releases both.
            let _provider = provider;
            let mut stream = subscription.into_stream();
            while let Some(log) = stream.next().await {
                match decode_event_log(&task_event, &log) {
                    Ok(record) => {
                        if let Ok(mut buf) = task_buffer.lock() {
                            buf.push(record);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to decode {} event: {}", task_name, e);
                    }
                }
            }
            tracing::debug!("Event stream for {} ended", task_name);
        });

        let id = uuid::Uuid::new_v4().to_string();
        self.subscriptions.insert(
            id.clone(),
            EventSubscription {
                event_name: event_name.to_string(),
                contract_address: contract_address.to_string(),
                buffer,
                task,
            },
        );

        tracing::info!("Subscribed to {} with id {}", event_name, id);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&EventSubscription> {
        self.subscriptions.get(id)
    }

    pub fn list(&self) -> Vec<(String, String, bool)> {
        self.subscriptions
            .iter()
            .map(|(id, sub)| (id.clone(), sub.event_name.clone(), sub.is_active()))
            .collect()
    }

    /// Explicit user-triggered unsubscribe. Returns false for unknown ids.
    pub fn unsubscribe(&mut self, id: &str) -> bool {
        if let Some(sub) = self.subscriptions.remove(id) {
            tracing::info!("Unsubscribed from {} ({})", sub.event_name, id);
            sub.unsubscribe();
            true
        } else {
            false
        }
    }

    pub fn unsubscribe_all(&mut self) {
        for (_, sub) in self.subscriptions.drain() {
            sub.unsubscribe();
        }
    }
}

/// Find an event by name in an ABI.
pub fn find_event<'a>(abi: &'a JsonAbi, event_name: &str) -> Result<&'a Event, AppError> {
    utils::validate_function_name(event_name).map_err(|e| AppError::gateway(e.to_string()))?;

    abi.events().find(|e| e.name == event_name).ok_or_else(|| {
        let available: Vec<String> = abi.events().map(|e| e.name.clone()).collect();
        if available.is_empty() {
            AppError::gateway(format!(
                "Event '{}' not found. The contract ABI contains no events.",
                event_name
            ))
        } else {
            AppError::gateway(format!(
                "Event '{}' not found in contract ABI. Available events: {}",
                event_name,
                available.join(", ")
            ))
        }
    })
}

/// Apply provided filter values to the indexed topic slots (topics 1-3).
fn apply_topic_filters(
    mut filter: Filter,
    event: &Event,
    filter_args: &HashMap<String, Value>,
) -> Result<Filter, AppError> {
    let mut topic_index = 0usize;
    for input in event.inputs.iter().filter(|i| i.indexed) {
        topic_index += 1;
        let Some(value) = filter_args.get(&input.name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        let word = gateway::json_to_dyn_sol_value(value, &input.ty)?
            .as_word()
            .ok_or_else(|| AppError::InvalidParameterFormat(input.ty.clone()))?;

        filter = match topic_index {
            1 => filter.topic1(word),
            2 => filter.topic2(word),
            3 => filter.topic3(word),
            // Only three indexed topics exist after the signature
            _ => break,
        };
    }
    Ok(filter)
}

/// Decode one received log against the event ABI and serialize it
/// independently into a display-safe record.
pub fn decode_event_log(
    event: &Event,
    log: &alloy::rpc::types::Log,
) -> Result<Value, AppError> {
    let decoded = event
        .decode_log(log.data(), true)
        .map_err(|e| AppError::gateway(format!("Failed to decode log: {}", e)))?;

    let mut return_values = Map::new();
    let mut indexed_values = decoded.indexed.iter();
    let mut body_values = decoded.body.iter();
    for input in &event.inputs {
        let value = if input.indexed {
            indexed_values.next()
        } else {
            body_values.next()
        };
        if let Some(value) = value {
            return_values.insert(input.name.clone(), codec::decoded_to_json(value)?);
        }
    }

    let mut record = Map::new();
    record.insert("event".to_string(), Value::String(event.name.clone()));
    record.insert(
        "address".to_string(),
        Value::String(format!("0x{:x}", log.address())),
    );
    record.insert(
        "blockNumber".to_string(),
        log.block_number.map_or(Value::Null, |n| n.into()),
    );
    record.insert(
        "transactionHash".to_string(),
        log.transaction_hash
            .map_or(Value::Null, |h| Value::String(format!("0x{:x}", h))),
    );
    record.insert(
        "logIndex".to_string(),
        log.log_index.map_or(Value::Null, |i| i.into()),
    );
    record.insert("returnValues".to_string(), Value::Object(return_values));

    Ok(codec::serialize_result(&Value::Object(record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_buffer_evicts_oldest_first() {
        let mut buffer = EventBuffer::new(3);
        for i in 0..5 {
            buffer.push(json!(i));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.snapshot(), vec![json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn test_buffer_capacity_is_two_hundred() {
        let mut buffer = EventBuffer::new(EVENT_BUFFER_CAPACITY);
        for i in 0..500 {
            buffer.push(json!(i));
        }

        assert_eq!(buffer.len(), 200);
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.first(), Some(&json!(300)));
        assert_eq!(snapshot.last(), Some(&json!(499)));
    }

    fn idle_subscription(event_name: &str) -> EventSubscription {
        EventSubscription {
            event_name: event_name.to_string(),
            contract_address: "0x0000000000000000000000000000000000000000".to_string(),
            buffer: Arc::new(Mutex::new(EventBuffer::new(8))),
            task: tokio::spawn(std::future::pending::<()>()),
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_all_drains_every_subscription() {
        let mut manager = SubscriptionManager::new();
        manager
            .subscriptions
            .insert("a".to_string(), idle_subscription("Transfer"));
        manager
            .subscriptions
            .insert("b".to_string(), idle_subscription("Approval"));
        assert_eq!(manager.list().len(), 2);

        manager.unsubscribe_all();
        assert!(manager.list().is_empty());
        assert!(manager.get("a").is_none());
    }

    #[test]
    fn test_find_event() {
        let abi: JsonAbi = serde_json::from_str(
            r#"[{
                "type": "event",
                "name": "Transfer",
                "inputs": [
                    {"name": "from", "type": "address", "indexed": true},
                    {"name": "to", "type": "address", "indexed": true},
                    {"name": "value", "type": "uint256", "indexed": false}
                ],
                "anonymous": false
            }]"#,
        )
        .unwrap();

        assert!(find_event(&abi, "Transfer").is_ok());
        assert!(find_event(&abi, "Approval").is_err());
    }
}
