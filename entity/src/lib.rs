//! SeaORM entities for the settlement schema.

pub mod prelude;

pub mod orders;
pub mod sea_orm_active_enums;
pub mod users;
