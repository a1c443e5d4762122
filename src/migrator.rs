use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_users_table::Migration),
            Box::new(m20240301_000002_create_operations_table::Migration),
            Box::new(m20240301_000003_create_user_rates_table::Migration),
            Box::new(m20240301_000004_create_materials_table::Migration),
            Box::new(m20240301_000005_create_tech_processes_table::Migration),
            Box::new(m20240301_000006_create_orders_table::Migration),
            Box::new(m20240301_000007_create_work_times_table::Migration),
        ]
    }
}

mod m20240301_000001_create_users_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Username).string_len(100).not_null())
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::FullName).string().not_null())
                        .col(
                            ColumnDef::new(Users::Role)
                                .string_len(16)
                                .not_null()
                                .default("worker"),
                        )
                        .col(ColumnDef::new(Users::HourlyRate).decimal_len(12, 2).null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
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
                        .name("idx_users_username")
                        .table(Users::Table)
                        .col(Users::Username)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Username,
        PasswordHash,
        FullName,
        Role,
        HourlyRate,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_operations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_operations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Operations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Operations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Operations::Name).string().not_null())
                        .col(ColumnDef::new(Operations::Description).text().null())
                        .col(
                            ColumnDef::new(Operations::DefaultRate)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Operations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Operations::UpdatedAt)
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
                        .name("idx_operations_name")
                        .table(Operations::Table)
                        .col(Operations::Name)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Operations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Operations {
        Table,
        Id,
        Name,
        Description,
        DefaultRate,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_user_rates_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_user_rates_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(UserRates::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(UserRates::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UserRates::UserId).uuid().not_null())
                        .col(ColumnDef::new(UserRates::OperationId).uuid().not_null())
                        .col(ColumnDef::new(UserRates::Rate).decimal_len(12, 2).not_null())
                        .col(
                            ColumnDef::new(UserRates::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UserRates::UpdatedAt)
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
                        .name("idx_user_rates_user_operation")
                        .table(UserRates::Table)
                        .col(UserRates::UserId)
                        .col(UserRates::OperationId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_user_rates_operation_id")
                        .table(UserRates::Table)
                        .col(UserRates::OperationId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(UserRates::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum UserRates {
        Table,
        Id,
        UserId,
        OperationId,
        Rate,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_materials_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_materials_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Materials::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Materials::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Materials::Name).string().not_null())
                        .col(ColumnDef::new(Materials::Code).string_len(100).not_null())
                        .col(
                            ColumnDef::new(Materials::Unit)
                                .string_len(32)
                                .not_null()
                                .default("шт"),
                        )
                        .col(ColumnDef::new(Materials::Description).text().null())
                        .col(ColumnDef::new(Materials::Price).decimal_len(14, 2).null())
                        .col(ColumnDef::new(Materials::Quantity).decimal_len(16, 4).null())
                        .col(ColumnDef::new(Materials::ExternalId).string().null())
                        .col(
                            ColumnDef::new(Materials::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Materials::UpdatedAt)
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
                        .name("idx_materials_code")
                        .table(Materials::Table)
                        .col(Materials::Code)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_materials_external_id")
                        .table(Materials::Table)
                        .col(Materials::ExternalId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Materials::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Materials {
        Table,
        Id,
        Name,
        Code,
        Unit,
        Description,
        Price,
        Quantity,
        ExternalId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000005_create_tech_processes_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_tech_processes_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TechProcesses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TechProcesses::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TechProcesses::Name).string().not_null())
                        .col(
                            ColumnDef::new(TechProcesses::ArticleNumber)
                                .string_len(100)
                                .not_null(),
                        )
                        .col(ColumnDef::new(TechProcesses::Description).text().null())
                        .col(ColumnDef::new(TechProcesses::Operations).json_binary().not_null())
                        .col(ColumnDef::new(TechProcesses::Materials).json_binary().not_null())
                        .col(
                            ColumnDef::new(TechProcesses::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(TechProcesses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TechProcesses::UpdatedAt)
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
                        .name("idx_tech_processes_article_number")
                        .table(TechProcesses::Table)
                        .col(TechProcesses::ArticleNumber)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TechProcesses::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum TechProcesses {
        Table,
        Id,
        Name,
        ArticleNumber,
        Description,
        Operations,
        Materials,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000006_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // operations, materials and child links are owned value lists
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string_len(100).not_null())
                        .col(ColumnDef::new(Orders::ArticleNumber).string_len(100).not_null())
                        .col(ColumnDef::new(Orders::Quantity).integer().not_null())
                        .col(ColumnDef::new(Orders::Operations).json_binary().not_null())
                        .col(ColumnDef::new(Orders::Materials).json_binary().not_null())
                        .col(
                            ColumnDef::new(Orders::Status)
                                .string_len(32)
                                .not_null()
                                .default("created"),
                        )
                        .col(
                            ColumnDef::new(Orders::StartDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::EndDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::Comments).text().null())
                        .col(ColumnDef::new(Orders::ParentOrderId).uuid().null())
                        .col(ColumnDef::new(Orders::ChildOrders).json_binary().not_null())
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
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
                        .name("idx_orders_order_number")
                        .table(Orders::Table)
                        .col(Orders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_start_date")
                        .table(Orders::Table)
                        .col(Orders::StartDate)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_parent_order_id")
                        .table(Orders::Table)
                        .col(Orders::ParentOrderId)
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
    enum Orders {
        Table,
        Id,
        OrderNumber,
        ArticleNumber,
        Quantity,
        Operations,
        Materials,
        Status,
        StartDate,
        EndDate,
        Comments,
        ParentOrderId,
        ChildOrders,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000007_create_work_times_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000007_create_work_times_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WorkTimes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkTimes::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WorkTimes::UserId).uuid().not_null())
                        .col(ColumnDef::new(WorkTimes::OrderId).uuid().null())
                        .col(ColumnDef::new(WorkTimes::Date).date().not_null())
                        .col(ColumnDef::new(WorkTimes::Hours).decimal_len(6, 2).not_null())
                        .col(
                            ColumnDef::new(WorkTimes::HourlyRate)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(WorkTimes::Description).text().not_null())
                        .col(
                            ColumnDef::new(WorkTimes::Approved)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(WorkTimes::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(WorkTimes::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkTimes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkTimes::UpdatedAt)
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
                        .name("idx_work_times_user_date")
                        .table(WorkTimes::Table)
                        .col(WorkTimes::UserId)
                        .col(WorkTimes::Date)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WorkTimes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WorkTimes {
        Table,
        Id,
        UserId,
        OrderId,
        Date,
        Hours,
        HourlyRate,
        Description,
        Approved,
        ApprovedBy,
        ApprovedAt,
        CreatedAt,
        UpdatedAt,
    }
}
