//! Provider Adapters (C9): one per upstream registry, each speaking
//! through the HTTP Caller and normalizing into canonical entities.

mod announcements;
mod associations;
mod certifications;
mod pagination;
mod registry;
mod search;
mod trade_register;

pub use announcements::{AnnouncementQuery, AnnouncementsAdapter};
pub use associations::{is_valid_association_id, AssociationsAdapter};
pub use certifications::CertificationsAdapter;
pub use pagination::{get_pages, PageInfo};
pub use registry::RegistryAdapter;
pub use search::{SearchAdapter, SearchFilters, Status};
pub use trade_register::TradeRegisterAdapter;
