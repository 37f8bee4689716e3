//! Domain models for the CRM.
//!
//! Plain data: rows read by [`crate::db`], inputs validated by the route
//! layer, and a few pure helpers (category paths, branding defaults,
//! finance formulas) that need no database.

pub mod audit;
pub mod client;
pub mod finance;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod production;
pub mod promocode;
pub mod session;
pub mod settings;
pub mod user;

pub use audit::{AuditFilter, AuditLogEntry, NewSystemError, SecurityEvent, SystemError};
pub use client::{
    Client, ClientDetails, ClientDuplicate, ClientField, ClientFilter, ClientInput, ClientListRow,
    ClientOption, ClientSort, ClientStats, ClientTotals,
};
pub use finance::{
    CategoryRevenue, DailyRevenue, Expense, ExpenseInput, FinanceSummary, FinancialStats,
    FundShare, LedgerKind, PaymentTransaction, ProfitLoss, SalaryRow, SalaryStats,
};
pub use inventory::{
    AdjustKind, Category, CategoryInput, CriticalItem, InventoryItem, InventoryTransaction,
    ItemDetails, ItemFilter, ItemInput, ItemStock, LocationInput, StockAdjustment, StockLevel,
    StockTransfer, StorageLocation, WarehouseActivity, WarehouseStats,
};
pub use notification::Notification;
pub use order::{
    Attachment, NewOrder, NewOrderItem, Order, OrderDetails, OrderField, OrderFilter, OrderItem,
    OrderListRow, OrderPage, OrderStats, Payment,
};
pub use production::{ProductionItem, ProductionStats, StageCounts};
pub use promocode::{
    BulkPromocodes, CartItem, PromoConstraints, PromoSummary, PromoValidation, Promocode,
    PromocodeInput, PromocodeListRow,
};
pub use session::{CurrentUser, keys as session_keys};
pub use settings::{Branding, SystemSetting, SystemStats};
pub use user::{Department, DepartmentInput, Role, RoleInput, User, UserInput, UserOption};
