//! Field-backed [`Properties`](crate::Properties) implementations
//!
//! Most models expose a handful of plain struct fields as properties.
//! [`impl_properties!`](crate::impl_properties) generates the accessor
//! boilerplate, converting through `serde_json`.
//!
//! ```
//! use canopy_tree::{impl_properties, Properties};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Clock {
//!     start: i64,
//!     end: i64,
//! }
//!
//! impl_properties!(Clock { start => "Start", end => "End" });
//!
//! let mut clock = Clock::default();
//! clock.set_property("end", serde_json::json!(10)).unwrap();
//! assert_eq!(clock.end, 10);
//! assert_eq!(clock.get_property("END"), Some(serde_json::json!(10)));
//! ```

/// Implement [`Properties`](crate::Properties) over named struct fields
///
/// Each field must implement `Serialize` and `DeserializeOwned`. Property
/// names compare ignoring ASCII case.
#[macro_export]
macro_rules! impl_properties {
    ($ty:ty { $($field:ident => $name:literal),* $(,)? }) => {
        impl $crate::Properties for $ty {
            fn property_names(&self) -> ::std::vec::Vec<::std::string::String> {
                ::std::vec![$(::std::string::String::from($name)),*]
            }

            fn get_property(&self, name: &str) -> ::std::option::Option<$crate::__private::Value> {
                $(
                    if name.eq_ignore_ascii_case($name) {
                        return $crate::__private::to_value(&self.$field).ok();
                    }
                )*
                ::std::option::Option::None
            }

            fn set_property(
                &mut self,
                name: &str,
                value: $crate::__private::Value,
            ) -> ::std::result::Result<(), $crate::PropertyError> {
                $(
                    if name.eq_ignore_ascii_case($name) {
                        self.$field = $crate::__private::from_value(value).map_err(|e| {
                            $crate::PropertyError::InvalidValue {
                                name: ::std::string::String::from($name),
                                reason: e.to_string(),
                            }
                        })?;
                        return ::std::result::Result::Ok(());
                    }
                )*
                ::std::result::Result::Err($crate::PropertyError::Unknown {
                    name: ::std::string::String::from(name),
                })
            }
        }
    };
}
