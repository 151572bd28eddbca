//! Merchant event mapping and deferred processing
//!
//! The vendor expects webhook deliveries to be acknowledged fast, whatever
//! the internal mapping state. The synchronous path therefore does two
//! things only: look up the internal restaurant for the event's merchant id
//! and enqueue the event. Fetching order details and confirming orders
//! happens on a background worker whose failures are logged, never surfaced
//! to the (already answered) webhook response.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ifood_auth::IntegrationStore;

use crate::api::MerchantApi;
use crate::error::Result;

/// Vendor event code for a freshly placed order.
const CODE_ORDER_PLACED: &str = "PLC";

/// Queue depth for events awaiting background processing. The vendor
/// redelivers on its own schedule, so dropping past this bound loses
/// nothing permanently.
pub const EVENT_QUEUE_DEPTH: usize = 256;

/// An inbound merchant event, camelCase on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantEvent {
    pub id: String,
    /// Vendor event code, e.g. "PLC" (placed), "CFM" (confirmed), "CAN" (cancelled)
    pub code: String,
    pub merchant_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Acknowledgment returned to the webhook caller.
#[derive(Debug, Clone, Serialize)]
pub struct EventAck {
    pub id: String,
    pub mapped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
}

/// An event that resolved to an internal restaurant, queued for the worker.
#[derive(Debug)]
pub struct MappedEvent {
    pub event: MerchantEvent,
    pub restaurant_id: String,
}

/// Create the bounded queue between the dispatcher and the worker.
pub fn event_channel() -> (mpsc::Sender<MappedEvent>, mpsc::Receiver<MappedEvent>) {
    mpsc::channel(EVENT_QUEUE_DEPTH)
}

/// Maps inbound events to restaurants and hands them to the worker.
pub struct EventDispatcher {
    store: Arc<IntegrationStore>,
    tx: mpsc::Sender<MappedEvent>,
}

impl EventDispatcher {
    pub fn new(store: Arc<IntegrationStore>, tx: mpsc::Sender<MappedEvent>) -> Self {
        Self { store, tx }
    }

    /// Synchronous webhook path: map, enqueue, acknowledge.
    ///
    /// An unmapped merchant id is logged and acknowledged; it is not an
    /// error, the merchant may simply not be integrated here. A full queue
    /// drops the event with a warning; the acknowledgment stands either way.
    pub async fn handle_event(&self, event: MerchantEvent) -> EventAck {
        let Some(restaurant_id) = self.store.restaurant_for_merchant(&event.merchant_id).await
        else {
            info!(
                event_id = %event.id,
                merchant_id = %event.merchant_id,
                "event for unmapped merchant, acknowledging"
            );
            metrics::counter!("webhook_events_total", "mapped" => "false").increment(1);
            return EventAck {
                id: event.id,
                mapped: false,
                restaurant_id: None,
            };
        };

        metrics::counter!("webhook_events_total", "mapped" => "true").increment(1);
        let ack = EventAck {
            id: event.id.clone(),
            mapped: true,
            restaurant_id: Some(restaurant_id.clone()),
        };

        if let Err(e) = self.tx.try_send(MappedEvent {
            event,
            restaurant_id,
        }) {
            warn!(error = %e, "event queue full, dropping event (vendor will redeliver)");
        }
        ack
    }
}

/// Spawn the background worker that drains the event queue.
///
/// Runs until the sending side is dropped. Per-event failures are logged
/// and the loop continues; one broken order must not stall the queue.
pub fn spawn_event_worker(
    mut rx: mpsc::Receiver<MappedEvent>,
    api: Arc<MerchantApi>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(mapped) = rx.recv().await {
            if let Err(e) = process_event(&api, &mapped).await {
                warn!(
                    event_id = %mapped.event.id,
                    merchant_id = %mapped.event.merchant_id,
                    error = %e,
                    "background event processing failed"
                );
            }
        }
        debug!("event worker stopped, queue closed");
    })
}

/// Heavy per-event work: fetch the full order, confirm placed orders.
async fn process_event(api: &MerchantApi, mapped: &MappedEvent) -> Result<()> {
    let event = &mapped.event;
    let Some(order_id) = event.order_id.as_deref() else {
        debug!(event_id = %event.id, code = %event.code, "event carries no order, nothing to do");
        return Ok(());
    };

    let details = api.get_order_details(&event.merchant_id, order_id).await?;
    if !details.is_success() {
        warn!(
            order_id,
            status = details.status,
            "order details fetch rejected by vendor"
        );
        return Ok(());
    }
    debug!(
        order_id,
        restaurant_id = %mapped.restaurant_id,
        "fetched order details"
    );

    if event.code == CODE_ORDER_PLACED {
        let confirmation = api.confirm_order(&event.merchant_id, order_id).await?;
        if confirmation.is_success() {
            info!(order_id, restaurant_id = %mapped.restaurant_id, "order confirmed");
        } else {
            warn!(
                order_id,
                status = confirmation.status,
                "order confirmation rejected by vendor"
            );
        }
    }
    Ok(())
}
