//! Authentication module for ThemeLoft

pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{Claims, JwtManager, TokenType};
pub use middleware::{optional_auth, require_auth, AuthState, AuthUser};
pub use password::{hash_password, verify_password};
