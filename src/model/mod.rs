pub mod attendance;
pub mod customer;
pub mod department_policy;
pub mod invoice;
pub mod leave_request;
pub mod product;
pub mod quotation;
pub mod role;
pub mod user;
