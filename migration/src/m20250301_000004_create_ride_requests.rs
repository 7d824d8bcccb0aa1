use sea_orm_migration::{prelude::*, schema::*};

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
                    .table(RideRequest::Table)
                    .if_not_exists()
                    .col(uuid(RideRequest::Id).primary_key())
                    .col(uuid(RideRequest::BookingId).not_null())
                    .col(uuid(RideRequest::DriverId).not_null())
                    .col(string_len(RideRequest::Status, 16).not_null().default("pending"))
                    .col(
                        timestamp_with_time_zone(RideRequest::RequestedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(RideRequest::RespondedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_booking")
                            .from(RideRequest::Table, RideRequest::BookingId)
                            .to(Booking::Table, Booking::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_driver")
                            .from(RideRequest::Table, RideRequest::DriverId)
                            .to(Driver::Table, Driver::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One request per (booking, driver) pair
        manager
            .create_index(
                Index::create()
                    .name("idx_ride_request_booking_driver")
                    .table(RideRequest::Table)
                    .col(RideRequest::BookingId)
                    .col(RideRequest::DriverId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RideRequest::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum RideRequest {
    Table,
    Id,
    BookingId,
    DriverId,
    Status,
    RequestedAt,
    RespondedAt,
}
