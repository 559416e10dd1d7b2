//! Data models

/// Declares a TEXT-backed enum with `as_str`, `Display` and `FromStr`.
///
/// Stored and serialized values are the SCREAMING_SNAKE_CASE strings used in
/// the database and the JSON API.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $( $text => Ok($name::$variant), )+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }
    };
}

mod audit;
mod ledger;
mod module;
mod subscription;
mod suspension;
mod tenant;
mod user;

pub use audit::*;
pub use ledger::*;
pub use module::*;
pub use subscription::*;
pub use suspension::*;
pub use tenant::*;
pub use user::*;
