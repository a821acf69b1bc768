use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Categories {
    Table,
    Id,
    LedgerId,
    Name,
    ParentId,
    Synonyms,
    IsIncome,
    Active,
    Position,
}

#[derive(Iden)]
enum Wallets {
    Table,
    Id,
    LedgerId,
    Name,
    WalletType,
    Synonyms,
    IsDefault,
    Status,
    Position,
}

#[derive(Iden)]
enum Transactions {
    Table,
    LedgerId,
    Id,
    Amount,
    Direction,
    CategoryId,
    CategoryName,
    WalletId,
    WalletName,
    Description,
    OccurredOn,
    CreatedAt,
    Status,
    SourceKey,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Categories::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Categories::LedgerId).string().not_null())
                    .col(ColumnDef::new(Categories::Name).string().not_null())
                    .col(ColumnDef::new(Categories::ParentId).string())
                    .col(
                        ColumnDef::new(Categories::Synonyms)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Categories::IsIncome)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Categories::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Categories::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-categories-ledger_id-name-unique")
                    .table(Categories::Table)
                    .col(Categories::LedgerId)
                    .col(Categories::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Wallets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Wallets::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Wallets::LedgerId).string().not_null())
                    .col(ColumnDef::new(Wallets::Name).string().not_null())
                    .col(ColumnDef::new(Wallets::WalletType).string().not_null())
                    .col(
                        ColumnDef::new(Wallets::Synonyms)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Wallets::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Wallets::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Wallets::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-wallets-ledger_id-name-unique")
                    .table(Wallets::Table)
                    .col(Wallets::LedgerId)
                    .col(Wallets::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Transactions::LedgerId).string().not_null())
                    .col(ColumnDef::new(Transactions::Id).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Direction).string().not_null())
                    .col(ColumnDef::new(Transactions::CategoryId).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::CategoryName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::WalletId).string().not_null())
                    .col(ColumnDef::new(Transactions::WalletName).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::Description)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::OccurredOn).date().not_null())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::Status)
                            .string()
                            .not_null()
                            .default("confirmed"),
                    )
                    .col(ColumnDef::new(Transactions::SourceKey).string())
                    .primary_key(
                        Index::create()
                            .col(Transactions::LedgerId)
                            .col(Transactions::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // NULL source keys never collide.
        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-ledger_id-source_key-unique")
                    .table(Transactions::Table)
                    .col(Transactions::LedgerId)
                    .col(Transactions::SourceKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-ledger_id-occurred_on")
                    .table(Transactions::Table)
                    .col(Transactions::LedgerId)
                    .col(Transactions::OccurredOn)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Wallets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Categories::Table).to_owned())
            .await
    }
}
