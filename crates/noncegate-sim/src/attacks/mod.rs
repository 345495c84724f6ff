pub mod forgery;
