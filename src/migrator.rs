use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_delivery_zones_table::Migration),
            Box::new(m20240101_000003_create_delivery_slots_table::Migration),
            Box::new(m20240101_000004_create_vouchers_table::Migration),
            Box::new(m20240101_000005_create_orders_table::Migration),
            Box::new(m20240101_000006_create_order_items_table::Migration),
            Box::new(m20240101_000007_create_voucher_usages_table::Migration),
        ]
    }
}

mod m20240101_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::IsAvailable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        Price,
        IsAvailable,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_delivery_zones_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_delivery_zones_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DeliveryZones::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeliveryZones::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliveryZones::Name).string().not_null())
                        .col(
                            ColumnDef::new(DeliveryZones::PostcodePrefixes)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryZones::DeliveryFee)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DeliveryZones::MinOrder)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DeliveryZones::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(DeliveryZones::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DeliveryZones::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum DeliveryZones {
        Table,
        Id,
        Name,
        PostcodePrefixes,
        DeliveryFee,
        MinOrder,
        IsActive,
        CreatedAt,
    }
}

mod m20240101_000003_create_delivery_slots_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_delivery_slots_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DeliverySlots::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeliverySlots::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliverySlots::SlotDate).date().not_null())
                        .col(ColumnDef::new(DeliverySlots::StartTime).time().not_null())
                        .col(ColumnDef::new(DeliverySlots::EndTime).time().not_null())
                        .col(
                            ColumnDef::new(DeliverySlots::MaxOrders)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliverySlots::CurrentBookings)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DeliverySlots::IsAvailable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(DeliverySlots::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One row per (date, window); bulk generation relies on this key.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_delivery_slots_date_window")
                        .table(DeliverySlots::Table)
                        .col(DeliverySlots::SlotDate)
                        .col(DeliverySlots::StartTime)
                        .col(DeliverySlots::EndTime)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DeliverySlots::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum DeliverySlots {
        Table,
        Id,
        SlotDate,
        StartTime,
        EndTime,
        MaxOrders,
        CurrentBookings,
        IsAvailable,
        CreatedAt,
    }
}

mod m20240101_000004_create_vouchers_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_vouchers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Vouchers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Vouchers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Vouchers::Code).string().not_null())
                        .col(ColumnDef::new(Vouchers::VoucherType).string().not_null())
                        .col(
                            ColumnDef::new(Vouchers::Value)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vouchers::MinOrder)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Vouchers::ValidFrom)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vouchers::ValidUntil)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Vouchers::MaxUses).integer().null())
                        .col(
                            ColumnDef::new(Vouchers::CurrentUses)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Vouchers::OneTimePerUser)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Vouchers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Vouchers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_vouchers_code")
                        .table(Vouchers::Table)
                        .col(Vouchers::Code)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Vouchers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Vouchers {
        Table,
        Id,
        Code,
        VoucherType,
        Value,
        MinOrder,
        ValidFrom,
        ValidUntil,
        MaxUses,
        CurrentUses,
        OneTimePerUser,
        IsActive,
        CreatedAt,
    }
}

mod m20240101_000005_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().null())
                        .col(ColumnDef::new(Orders::GuestEmail).string().null())
                        .col(
                            ColumnDef::new(Orders::Subtotal)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::DiscountAmount)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::DiscountedSubtotal)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::DeliveryFee)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::Total)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(ColumnDef::new(Orders::DeliveryName).string().not_null())
                        .col(ColumnDef::new(Orders::DeliveryPhone).string().not_null())
                        .col(ColumnDef::new(Orders::AddressLine1).string().not_null())
                        .col(ColumnDef::new(Orders::AddressLine2).string().null())
                        .col(ColumnDef::new(Orders::City).string().not_null())
                        .col(ColumnDef::new(Orders::Postcode).string().not_null())
                        .col(ColumnDef::new(Orders::ZoneId).uuid().not_null())
                        .col(ColumnDef::new(Orders::SlotId).uuid().not_null())
                        .col(ColumnDef::new(Orders::PaymentRef).string().null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string().not_null())
                        .col(
                            ColumnDef::new(Orders::FulfillmentStatus)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::VatNumber).string().null())
                        .col(ColumnDef::new(Orders::PoNumber).string().null())
                        .col(ColumnDef::new(Orders::VoucherId).uuid().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_slot_id")
                                .from(Orders::Table, Orders::SlotId)
                                .to(DeliverySlots::Table, DeliverySlots::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_zone_id")
                                .from(Orders::Table, Orders::ZoneId)
                                .to(DeliveryZones::Table, DeliveryZones::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // Intake retries on collision; this index is the backstop.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_order_number")
                        .table(Orders::Table)
                        .col(Orders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Webhook reconciliation locates orders by authorization handle.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_payment_ref")
                        .table(Orders::Table)
                        .col(Orders::PaymentRef)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_created_at")
                        .table(Orders::Table)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        UserId,
        GuestEmail,
        Subtotal,
        DiscountAmount,
        DiscountedSubtotal,
        DeliveryFee,
        Total,
        Currency,
        DeliveryName,
        DeliveryPhone,
        AddressLine1,
        AddressLine2,
        City,
        Postcode,
        ZoneId,
        SlotId,
        PaymentRef,
        PaymentStatus,
        FulfillmentStatus,
        VatNumber,
        PoNumber,
        VoucherId,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    use super::m20240101_000002_create_delivery_zones_table::DeliveryZones;
    use super::m20240101_000003_create_delivery_slots_table::DeliverySlots;
}

mod m20240101_000006_create_order_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Name).string().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::TotalPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::SubstitutionProductId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::SubstitutionStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Name,
        UnitPrice,
        Quantity,
        TotalPrice,
        SubstitutionProductId,
        SubstitutionStatus,
        CreatedAt,
        UpdatedAt,
    }

    use super::m20240101_000005_create_orders_table::Orders;
}

mod m20240101_000007_create_voucher_usages_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_voucher_usages_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(VoucherUsages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(VoucherUsages::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(VoucherUsages::VoucherId).uuid().not_null())
                        .col(ColumnDef::new(VoucherUsages::UserId).uuid().null())
                        .col(ColumnDef::new(VoucherUsages::GuestEmail).string().null())
                        .col(ColumnDef::new(VoucherUsages::OrderId).uuid().not_null())
                        .col(ColumnDef::new(VoucherUsages::SingleUseKey).string().null())
                        .col(
                            ColumnDef::new(VoucherUsages::RedeemedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_voucher_usages_voucher_id")
                                .from(VoucherUsages::Table, VoucherUsages::VoucherId)
                                .to(Vouchers::Table, Vouchers::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_voucher_usages_voucher_id")
                        .table(VoucherUsages::Table)
                        .col(VoucherUsages::VoucherId)
                        .to_owned(),
                )
                .await?;

            // Enforces one-time-per-user redemption at the database; the key
            // is null for multi-use vouchers and nulls never collide.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_voucher_usages_single_use_key")
                        .table(VoucherUsages::Table)
                        .col(VoucherUsages::SingleUseKey)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(VoucherUsages::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum VoucherUsages {
        Table,
        Id,
        VoucherId,
        UserId,
        GuestEmail,
        OrderId,
        SingleUseKey,
        RedeemedAt,
    }

    use super::m20240101_000004_create_vouchers_table::Vouchers;
}
