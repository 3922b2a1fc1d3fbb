pub mod jwt;

pub use jwt::SessionTokens;
