pub mod attendance;
pub mod customer;
pub mod invoice;
pub mod leave_request;
pub mod policy;
pub mod product;
pub mod quotation;
pub mod user;
