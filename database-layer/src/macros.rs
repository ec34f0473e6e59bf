// Text-column mapping for domain enums

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum so it
/// can be stored in and read back from a `TEXT` column.
///
/// ```rust
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// pub enum BatchStatus { Draft, Submitted }
///
/// database_layer::text_enum!(BatchStatus {
///     Draft => "draft",
///     Submitted => "submitted",
/// });
///
/// assert_eq!(BatchStatus::Draft.as_str(), "draft");
/// assert_eq!("submitted".parse::<BatchStatus>(), Ok(BatchStatus::Submitted));
/// ```
#[macro_export]
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stored text representation
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::UnknownVariant;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::UnknownVariant::new(stringify!($name), other)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum StepStatus {
        Pending,
        InProgress,
    }

    crate::text_enum!(StepStatus {
        Pending => "pending",
        InProgress => "in_progress",
    });

    #[test]
    fn test_text_enum_round_trip() {
        for status in StepStatus::ALL {
            assert_eq!(status.as_str().parse::<StepStatus>(), Ok(*status));
        }
        assert_eq!(StepStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn test_text_enum_rejects_unknown() {
        let err = "done".parse::<StepStatus>().unwrap_err();
        assert_eq!(err.type_name, "StepStatus");
        assert_eq!(err.value, "done");
    }
}
