use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_users::User;
use super::m20250301_000002_create_drivers::Driver;
use super::m20250301_000003_create_bookings::Booking;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RideRating::Table)
                    .if_not_exists()
                    .col(uuid(RideRating::Id).primary_key())
                    .col(uuid(RideRating::BookingId).not_null())
                    .col(uuid(RideRating::UserId).not_null())
                    .col(uuid(RideRating::DriverId).not_null())
                    .col(integer(RideRating::Rating).not_null())
                    .col(text_null(RideRating::Comment))
                    .col(
                        timestamp_with_time_zone(RideRating::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_rating_booking")
                            .from(RideRating::Table, RideRating::BookingId)
                            .to(Booking::Table, Booking::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_rating_user")
                            .from(RideRating::Table, RideRating::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_rating_driver")
                            .from(RideRating::Table, RideRating::DriverId)
                            .to(Driver::Table, Driver::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // A rider rates a booking at most once
        manager
            .create_index(
                Index::create()
                    .name("idx_ride_rating_booking_user")
                    .table(RideRating::Table)
                    .col(RideRating::BookingId)
                    .col(RideRating::UserId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RideRating::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum RideRating {
    Table,
    Id,
    BookingId,
    UserId,
    DriverId,
    Rating,
    Comment,
    CreatedAt,
}
