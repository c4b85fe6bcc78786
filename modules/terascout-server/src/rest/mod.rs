pub mod scouts;
