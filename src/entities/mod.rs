pub mod delivery_slot;
pub mod delivery_zone;
pub mod order;
pub mod order_item;
pub mod product;
pub mod voucher;
pub mod voucher_usage;
