//! OAuth2 authorization server schema.
//!
//! Creates tables for:
//! - oauth2_client: Registered OAuth2 clients (secrets stored as Argon2id hashes)
//! - oauth2_user: Profile claims of end users
//! - oauth2_auth_request: Pending authorization requests awaiting login completion
//! - oauth2_authorization: Single-use authorization codes, keyed by SHA-256 digest
//! - oauth2_token: Access and refresh tokens, keyed by SHA-256 digest

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Client::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Client::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuth2Client::SecretHash).string().null())
                    .col(ColumnDef::new(OAuth2Client::Name).string().not_null())
                    .col(ColumnDef::new(OAuth2Client::RedirectUris).text().not_null())
                    .col(
                        ColumnDef::new(OAuth2Client::Scopes)
                            .text()
                            .not_null()
                            .default("openid profile email"),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuth2User::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2User::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuth2User::Email).string().null())
                    .col(
                        ColumnDef::new(OAuth2User::EmailVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(OAuth2User::Name).string().null())
                    .col(ColumnDef::new(OAuth2User::Picture).string().null())
                    .col(ColumnDef::new(OAuth2User::Locale).string().null())
                    .col(ColumnDef::new(OAuth2User::PhoneNumber).string().null())
                    .col(
                        ColumnDef::new(OAuth2User::PhoneNumberVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuth2User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuth2AuthRequest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2AuthRequest::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AuthRequest::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AuthRequest::RedirectUri)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuth2AuthRequest::Scope).text().not_null())
                    .col(ColumnDef::new(OAuth2AuthRequest::State).text().null())
                    .col(ColumnDef::new(OAuth2AuthRequest::Nonce).text().null())
                    .col(
                        ColumnDef::new(OAuth2AuthRequest::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(OAuth2AuthRequest::UserId).string().null())
                    .col(
                        ColumnDef::new(OAuth2AuthRequest::AuthTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AuthRequest::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AuthRequest::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuth2Authorization::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Authorization::CodeHash)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::RequestId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::RedirectUri)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuth2Authorization::Scope).text().not_null())
                    .col(ColumnDef::new(OAuth2Authorization::Nonce).text().null())
                    .col(
                        ColumnDef::new(OAuth2Authorization::AuthTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuth2Token::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Token::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::TokenHash)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OAuth2Token::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(OAuth2Token::ClientId).string().not_null())
                    .col(ColumnDef::new(OAuth2Token::UserId).string().not_null())
                    .col(ColumnDef::new(OAuth2Token::Scope).text().not_null())
                    .col(
                        ColumnDef::new(OAuth2Token::Status)
                            .string_len(16)
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(OAuth2Token::PredecessorId).string().null())
                    .col(
                        ColumnDef::new(OAuth2Token::AuthTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::IssuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Expiry indexes serve the cleanup task
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_auth_request_expires_at")
                    .table(OAuth2AuthRequest::Table)
                    .col(OAuth2AuthRequest::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_authorization_expires_at")
                    .table(OAuth2Authorization::Table)
                    .col(OAuth2Authorization::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_token_client_id")
                    .table(OAuth2Token::Table)
                    .col(OAuth2Token::ClientId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_token_user_id")
                    .table(OAuth2Token::Table)
                    .col(OAuth2Token::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_token_expires_at")
                    .table(OAuth2Token::Table)
                    .col(OAuth2Token::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for index in [
            "idx_oauth2_token_expires_at",
            "idx_oauth2_token_user_id",
            "idx_oauth2_token_client_id",
            "idx_oauth2_authorization_expires_at",
            "idx_oauth2_auth_request_expires_at",
        ] {
            manager
                .drop_index(Index::drop().name(index).to_owned())
                .await?;
        }

        manager
            .drop_table(Table::drop().table(OAuth2Token::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Authorization::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2AuthRequest::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2User::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Client::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum OAuth2Client {
    #[sea_orm(iden = "oauth2_client")]
    Table,
    Id,
    SecretHash,
    Name,
    RedirectUris,
    Scopes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OAuth2User {
    #[sea_orm(iden = "oauth2_user")]
    Table,
    Id,
    Email,
    EmailVerified,
    Name,
    Picture,
    Locale,
    PhoneNumber,
    PhoneNumberVerified,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2AuthRequest {
    #[sea_orm(iden = "oauth2_auth_request")]
    Table,
    Id,
    ClientId,
    RedirectUri,
    Scope,
    State,
    Nonce,
    Status,
    UserId,
    AuthTime,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2Authorization {
    #[sea_orm(iden = "oauth2_authorization")]
    Table,
    CodeHash,
    RequestId,
    ClientId,
    UserId,
    RedirectUri,
    Scope,
    Nonce,
    AuthTime,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2Token {
    #[sea_orm(iden = "oauth2_token")]
    Table,
    Id,
    TokenHash,
    Kind,
    ClientId,
    UserId,
    Scope,
    Status,
    PredecessorId,
    AuthTime,
    IssuedAt,
    ExpiresAt,
    RevokedAt,
}
