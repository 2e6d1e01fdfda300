// Domain layer - Core pipeline models
pub mod alert;
pub mod connection;
pub mod image;
pub mod notification;
pub mod paging;
pub mod prediction;
pub mod reading;
