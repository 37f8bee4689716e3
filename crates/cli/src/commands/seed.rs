//! Demo data for local development.
//!
//! Inserts a handful of clients, a clothing category, some stock items at
//! the default warehouse and a welcome promocode. Records that already exist are skipped, so the
//! command can be re-run.

use rust_decimal::Decimal;

use merch_crm::db::{
    CategoryRepository, ClientRepository, InventoryRepository, LocationRepository,
    PromocodeRepository, RepositoryError, UserRepository,
};
use merch_crm::models::{CategoryInput, ClientInput, ItemInput, PromoConstraints, PromocodeInput};
use merch_crm::services::{InitialStock, PromocodeError, PromocodeService, StockError, StockService};
use merch_crm_core::{ClientType, DiscountType, InventoryItemType, MeasurementUnit};

use super::{CommandError, connect};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("No administrator found; run `crm-cli user create` first")]
    NoAdmin,

    #[error("No storage location found; run `crm-cli migrate` first")]
    NoLocation,

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Promocode(#[from] PromocodeError),
}

/// (last name, first name, phone, city, type, company)
const CLIENTS: &[(&str, &str, &str, &str, ClientType, Option<&str>)] = &[
    ("Ivanova", "Maria", "+7 900 100-20-30", "Moscow", ClientType::B2c, None),
    ("Petrov", "Alexey", "+7 900 200-30-40", "Kazan", ClientType::B2c, None),
    (
        "Smirnov",
        "Dmitry",
        "+7 900 300-40-50",
        "Moscow",
        ClientType::B2b,
        Some("Northwind Events"),
    ),
];

const CATEGORY: &str = "Demo clothing";

const PROMOCODE: &str = "WELCOME10";

/// (name, sku, quantity, cost)
const ITEMS: &[(&str, &str, i32, i64)] = &[
    ("T-shirt black M", "TS-BLK-M", 120, 350),
    ("T-shirt white L", "TS-WHT-L", 80, 350),
    ("Hoodie grey XL", "HD-GRY-XL", 15, 1200),
];

/// Insert demo records.
pub async fn run() -> Result<(), SeedError> {
    let pool = connect().await?;

    let actor = UserRepository::new(&pool)
        .admin_ids()
        .await?
        .into_iter()
        .next()
        .ok_or(SeedError::NoAdmin)?;

    let clients = ClientRepository::new(&pool);
    let mut created_clients = 0;
    for &(last_name, first_name, phone, city, client_type, company) in CLIENTS {
        let existing = clients
            .find_duplicates(Some(phone), None, None, None)
            .await?;
        if !existing.is_empty() {
            tracing::debug!(phone, "Client already present, skipping");
            continue;
        }

        let input = ClientInput {
            client_type,
            last_name: last_name.to_owned(),
            first_name: first_name.to_owned(),
            patronymic: None,
            company: company.map(str::to_owned),
            phone: phone.to_owned(),
            telegram: None,
            instagram: None,
            email: None,
            city: Some(city.to_owned()),
            address: None,
            comments: Some("Demo client".to_owned()),
            social_link: None,
            acquisition_source: Some("seed".to_owned()),
            manager_id: Some(actor),
        };
        clients.create(&input, actor).await?;
        created_clients += 1;
    }

    let location = LocationRepository::new(&pool)
        .list()
        .await?
        .into_iter()
        .find(|l| l.is_default)
        .ok_or(SeedError::NoLocation)?;

    let categories = CategoryRepository::new(&pool);
    let existing = categories
        .list()
        .await?
        .into_iter()
        .find(|c| c.name == CATEGORY)
        .map(|c| c.id);
    let category_id = match existing {
        Some(id) => id,
        None => {
            categories
                .create(
                    &CategoryInput {
                        name: CATEGORY.to_owned(),
                        description: None,
                        icon: None,
                        color: Some("#3b82f6".to_owned()),
                        prefix: Some("DEMO".to_owned()),
                        parent_id: None,
                        default_unit: MeasurementUnit::Pcs,
                        is_active: true,
                    },
                    actor,
                )
                .await?
        }
    };

    let inventory = InventoryRepository::new(&pool);
    let stock = StockService::new(&pool);
    let mut created_items = 0;
    for &(name, sku, quantity, cost) in ITEMS {
        if inventory.duplicate_exists(name, Some(sku), None).await? {
            tracing::debug!(sku, "Item already present, skipping");
            continue;
        }

        let input = ItemInput {
            name: name.to_owned(),
            sku: Some(sku.to_owned()),
            category_id: Some(category_id),
            item_type: InventoryItemType::Clothing,
            unit: MeasurementUnit::Pcs,
            low_stock_threshold: 20,
            critical_stock_threshold: 5,
            description: None,
            cost_price: Some(Decimal::from(cost)),
            selling_price: Some(Decimal::from(cost * 2)),
            attributes: serde_json::json!({}),
        };
        stock
            .create_item(
                &input,
                Some(InitialStock {
                    location_id: location.id,
                    quantity,
                }),
                actor,
            )
            .await?;
        created_items += 1;
    }

    let promocode_created = if PromocodeRepository::new(&pool)
        .find_by_code(PROMOCODE)
        .await?
        .is_some()
    {
        false
    } else {
        let input = PromocodeInput {
            name: Some("Welcome discount".to_owned()),
            code: PROMOCODE.to_owned(),
            discount_type: DiscountType::Percentage,
            value: Decimal::from(10),
            min_order_amount: Decimal::from(1000),
            max_discount_amount: Decimal::from(5000),
            start_date: None,
            expires_at: None,
            usage_limit: None,
            is_active: true,
            admin_comment: Some("Demo data".to_owned()),
            constraints: PromoConstraints::default(),
        };
        PromocodeService::new(&pool).create(&input, actor).await?;
        true
    };

    tracing::info!(
        clients = created_clients,
        items = created_items,
        promocode = promocode_created,
        location = %location.name,
        "Demo data inserted"
    );
    Ok(())
}
