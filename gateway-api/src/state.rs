//! Shared application state threaded through every route (spec §9
//! "Singletons": explicit dependencies constructed at boot, no
//! module-level statics).

use gateway_audit::AuditLedger;
use gateway_core::{GatewayConfig, SharedClock};
use gateway_fanout::FanoutEngine;
use gateway_ingest::IngestScheduler;
use gateway_providers::{AnnouncementsAdapter, AssociationsAdapter, CertificationsAdapter, TradeRegisterAdapter};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub fanout: Arc<FanoutEngine>,
    pub trade_register: Arc<TradeRegisterAdapter>,
    pub associations: Arc<AssociationsAdapter>,
    pub announcements: Arc<AnnouncementsAdapter>,
    pub certifications: Arc<CertificationsAdapter>,
    pub ingest: Arc<IngestScheduler>,
    pub audit: Arc<AuditLedger>,
    pub config: Arc<GatewayConfig>,
    pub clock: SharedClock,
}
