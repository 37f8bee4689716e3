//! Business logic services.
//!
//! Services own the multi-step writes: each runs its statements in one
//! transaction, writes the audit row inside it, and fires notifications
//! only after commit.
//!
//! # Services
//!
//! - `auth` - Password login, logout and staff account management
//! - `notifications` - Staff notifications, stock alerts and daily checks
//! - `orders` - Order intake, status lifecycle, payments and attachments
//! - `production` - Production board and defect write-offs
//! - `promocodes` - Promocode validation, discounts and bulk generation
//! - `settings` - Branding, system settings and maintenance mode
//! - `stock` - Item creation, stock adjustments, transfers and auto-archive
//! - `storage` - Local file storage rooted at `CRM_STORAGE_ROOT`

pub mod auth;
pub mod notifications;
pub mod orders;
pub mod production;
pub mod promocodes;
pub mod settings;
pub mod stock;
pub mod storage;

pub use auth::{AuthError, AuthService, RequestMeta};
pub use notifications::{DailyReport, NotificationError, NotificationService};
pub use orders::{CreatedOrder, OrderError, OrderService, Upload};
pub use production::{ProductionError, ProductionService};
pub use promocodes::{PromocodeError, PromocodeService};
pub use settings::{SettingsCache, SettingsService, SettingsServiceError};
pub use stock::{InitialStock, StockError, StockService};
pub use storage::{LocalStorage, StorageError, StorageService};
