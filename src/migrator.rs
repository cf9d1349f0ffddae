use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_batches_table::Migration),
            Box::new(m20250101_000002_create_lots_tables::Migration),
            Box::new(m20250101_000003_create_tank_tables::Migration),
            Box::new(m20250101_000004_create_packaging_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20250101_000001_create_batches_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_batches_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Recipes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Recipes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Recipes::TenantId).string().not_null())
                        .col(ColumnDef::new(Recipes::Name).string().not_null())
                        .col(ColumnDef::new(Recipes::Style).string().null())
                        .col(
                            ColumnDef::new(Recipes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Batches::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Batches::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Batches::TenantId).string().not_null())
                        .col(ColumnDef::new(Batches::BatchNumber).string().not_null())
                        .col(ColumnDef::new(Batches::RecipeId).uuid().null())
                        .col(ColumnDef::new(Batches::Status).string().not_null())
                        .col(ColumnDef::new(Batches::Volume).double().not_null())
                        .col(
                            ColumnDef::new(Batches::PackagedVolume)
                                .double()
                                .not_null()
                                .default(0.0),
                        )
                        .col(ColumnDef::new(Batches::OriginalGravity).double().null())
                        .col(ColumnDef::new(Batches::CurrentGravity).double().null())
                        .col(ColumnDef::new(Batches::FinalGravity).double().null())
                        .col(ColumnDef::new(Batches::TankId).uuid().null())
                        .col(
                            ColumnDef::new(Batches::BrewDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Batches::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Batches::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Batches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Batches::UpdatedAt)
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
                        .name("idx_batches_tenant_batch_number")
                        .table(Batches::Table)
                        .col(Batches::TenantId)
                        .col(Batches::BatchNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(GravityReadings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GravityReadings::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(GravityReadings::TenantId).string().not_null())
                        .col(ColumnDef::new(GravityReadings::BatchId).uuid().not_null())
                        .col(ColumnDef::new(GravityReadings::Gravity).double().not_null())
                        .col(ColumnDef::new(GravityReadings::Temperature).double().null())
                        .col(ColumnDef::new(GravityReadings::Notes).string().null())
                        .col(ColumnDef::new(GravityReadings::RecordedBy).string().null())
                        .col(
                            ColumnDef::new(GravityReadings::RecordedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_gravity_readings_batch_id")
                                .from(GravityReadings::Table, GravityReadings::BatchId)
                                .to(Batches::Table, Batches::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_gravity_readings_batch")
                        .table(GravityReadings::Table)
                        .col(GravityReadings::TenantId)
                        .col(GravityReadings::BatchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(GravityReadings::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Batches::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Recipes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Recipes {
        Table,
        Id,
        TenantId,
        Name,
        Style,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Batches {
        Table,
        Id,
        TenantId,
        BatchNumber,
        RecipeId,
        Status,
        Volume,
        PackagedVolume,
        OriginalGravity,
        CurrentGravity,
        FinalGravity,
        TankId,
        BrewDate,
        CompletedAt,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum GravityReadings {
        Table,
        Id,
        TenantId,
        BatchId,
        Gravity,
        Temperature,
        Notes,
        RecordedBy,
        RecordedAt,
    }
}

mod m20250101_000002_create_lots_tables {

    use super::m20250101_000001_create_batches_table::Batches;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_lots_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Lots::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Lots::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Lots::TenantId).string().not_null())
                        .col(ColumnDef::new(Lots::LotCode).string().not_null())
                        .col(ColumnDef::new(Lots::Phase).string().null())
                        .col(ColumnDef::new(Lots::Status).string().not_null())
                        .col(ColumnDef::new(Lots::PlannedVolume).double().null())
                        .col(ColumnDef::new(Lots::ActualVolume).double().null())
                        .col(ColumnDef::new(Lots::ParentLotId).uuid().null())
                        .col(
                            ColumnDef::new(Lots::IsBlendResult)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Lots::BlendedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Lots::SplitAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Lots::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Lots::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Lots::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Lots::UpdatedAt)
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
                        .name("idx_lots_tenant_lot_code")
                        .table(Lots::Table)
                        .col(Lots::TenantId)
                        .col(Lots::LotCode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_lots_parent_lot_id")
                        .table(Lots::Table)
                        .col(Lots::ParentLotId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LotBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LotBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LotBatches::TenantId).string().not_null())
                        .col(ColumnDef::new(LotBatches::LotId).uuid().not_null())
                        .col(ColumnDef::new(LotBatches::BatchId).uuid().not_null())
                        .col(
                            ColumnDef::new(LotBatches::VolumeContribution)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotBatches::BatchPercentage)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_lot_batches_lot_id")
                                .from(LotBatches::Table, LotBatches::LotId)
                                .to(Lots::Table, Lots::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_lot_batches_batch_id")
                                .from(LotBatches::Table, LotBatches::BatchId)
                                .to(Batches::Table, Batches::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_lot_batches_lot_id")
                        .table(LotBatches::Table)
                        .col(LotBatches::LotId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_lot_batches_batch_id")
                        .table(LotBatches::Table)
                        .col(LotBatches::BatchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LotBatches::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Lots::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Lots {
        Table,
        Id,
        TenantId,
        LotCode,
        Phase,
        Status,
        PlannedVolume,
        ActualVolume,
        ParentLotId,
        IsBlendResult,
        BlendedAt,
        SplitAt,
        CompletedAt,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum LotBatches {
        Table,
        Id,
        TenantId,
        LotId,
        BatchId,
        VolumeContribution,
        BatchPercentage,
        CreatedAt,
    }
}

mod m20250101_000003_create_tank_tables {

    use super::m20250101_000002_create_lots_tables::Lots;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_tank_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Tanks::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Tanks::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Tanks::TenantId).string().not_null())
                        .col(ColumnDef::new(Tanks::Name).string().not_null())
                        .col(ColumnDef::new(Tanks::TankType).string().not_null())
                        .col(ColumnDef::new(Tanks::CapacityLiters).double().null())
                        .col(ColumnDef::new(Tanks::Status).string().not_null())
                        .col(ColumnDef::new(Tanks::CurrentLotId).uuid().null())
                        .col(ColumnDef::new(Tanks::CurrentPhase).string().null())
                        .col(
                            ColumnDef::new(Tanks::NeedsCleaning)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Tanks::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Tanks::UpdatedAt)
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
                        .name("idx_tanks_tenant_id")
                        .table(Tanks::Table)
                        .col(Tanks::TenantId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TankAssignments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TankAssignments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TankAssignments::TenantId).string().not_null())
                        .col(ColumnDef::new(TankAssignments::TankId).uuid().not_null())
                        .col(ColumnDef::new(TankAssignments::LotId).uuid().not_null())
                        .col(ColumnDef::new(TankAssignments::Phase).string().not_null())
                        .col(ColumnDef::new(TankAssignments::Status).string().not_null())
                        .col(
                            ColumnDef::new(TankAssignments::PlannedStart)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TankAssignments::PlannedEnd)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TankAssignments::ActualStart)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TankAssignments::ActualEnd)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(TankAssignments::PlannedVolume).double().null())
                        .col(ColumnDef::new(TankAssignments::ActualVolume).double().null())
                        .col(
                            ColumnDef::new(TankAssignments::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(TankAssignments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TankAssignments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_tank_assignments_tank_id")
                                .from(TankAssignments::Table, TankAssignments::TankId)
                                .to(Tanks::Table, Tanks::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_tank_assignments_lot_id")
                                .from(TankAssignments::Table, TankAssignments::LotId)
                                .to(Lots::Table, Lots::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_tank_assignments_lot_id")
                        .table(TankAssignments::Table)
                        .col(TankAssignments::LotId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_tank_assignments_tank_status")
                        .table(TankAssignments::Table)
                        .col(TankAssignments::TankId)
                        .col(TankAssignments::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TankAssignments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Tanks::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Tanks {
        Table,
        Id,
        TenantId,
        Name,
        TankType,
        CapacityLiters,
        Status,
        CurrentLotId,
        CurrentPhase,
        NeedsCleaning,
        Version,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TankAssignments {
        Table,
        Id,
        TenantId,
        TankId,
        LotId,
        Phase,
        Status,
        PlannedStart,
        PlannedEnd,
        ActualStart,
        ActualEnd,
        PlannedVolume,
        ActualVolume,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000004_create_packaging_tables {

    use super::m20250101_000001_create_batches_table::Batches;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_packaging_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PackagingRuns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PackagingRuns::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PackagingRuns::TenantId).string().not_null())
                        .col(ColumnDef::new(PackagingRuns::BatchId).uuid().not_null())
                        .col(ColumnDef::new(PackagingRuns::LotId).uuid().null())
                        .col(ColumnDef::new(PackagingRuns::LotNumber).string().not_null())
                        .col(ColumnDef::new(PackagingRuns::PackageType).string().not_null())
                        .col(ColumnDef::new(PackagingRuns::Quantity).integer().not_null())
                        .col(ColumnDef::new(PackagingRuns::VolumeTotal).double().not_null())
                        .col(ColumnDef::new(PackagingRuns::PerformedBy).string().not_null())
                        .col(
                            ColumnDef::new(PackagingRuns::PerformedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PackagingRuns::Notes).string().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_packaging_runs_batch_id")
                                .from(PackagingRuns::Table, PackagingRuns::BatchId)
                                .to(Batches::Table, Batches::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_packaging_runs_lot_number")
                        .table(PackagingRuns::Table)
                        .col(PackagingRuns::TenantId)
                        .col(PackagingRuns::LotNumber)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BatchTimelineEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BatchTimelineEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchTimelineEvents::TenantId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BatchTimelineEvents::BatchId).uuid().not_null())
                        .col(
                            ColumnDef::new(BatchTimelineEvents::EventType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchTimelineEvents::Description)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BatchTimelineEvents::Metadata).json().null())
                        .col(ColumnDef::new(BatchTimelineEvents::CreatedBy).string().null())
                        .col(
                            ColumnDef::new(BatchTimelineEvents::CreatedAt)
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
                        .name("idx_batch_timeline_events_batch")
                        .table(BatchTimelineEvents::Table)
                        .col(BatchTimelineEvents::TenantId)
                        .col(BatchTimelineEvents::BatchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BatchTimelineEvents::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PackagingRuns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PackagingRuns {
        Table,
        Id,
        TenantId,
        BatchId,
        LotId,
        LotNumber,
        PackageType,
        Quantity,
        VolumeTotal,
        PerformedBy,
        PerformedAt,
        Notes,
    }

    #[derive(DeriveIden)]
    enum BatchTimelineEvents {
        Table,
        Id,
        TenantId,
        BatchId,
        EventType,
        Description,
        Metadata,
        CreatedBy,
        CreatedAt,
    }
}
