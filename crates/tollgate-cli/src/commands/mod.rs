pub mod inspect;
pub mod jwks;
pub mod verify;
