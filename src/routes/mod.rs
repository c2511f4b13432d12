pub mod auth;
pub mod customers;
pub mod dashboard;
pub mod health;
pub mod invoices;
pub mod rbac;
pub mod trash;
