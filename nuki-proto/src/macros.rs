/// Declares a C-like enum with a fixed integer representation on the wire.
///
/// Unknown values decode to [`DecodeError::UnknownVariant`](crate::DecodeError).
/// Enums declared `open` instead keep them in an `Other` variant, for values
/// the device reports rather than ones a message is selected by.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        open $vis:vis enum $name:ident : $repr:ty {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// Value without a name in this build, kept as received
            Other($repr),
        }

        impl $name {
            pub const fn value(self) -> $repr {
                match self {
                    $( Self::$variant => $value, )+
                    Self::Other(value) => value,
                }
            }

            /// The named variant for `value`
            pub fn from_value(value: $repr) -> Option<Self> {
                match value {
                    $( $value => Some(Self::$variant), )+
                    _ => None,
                }
            }

            pub fn from_raw(value: $repr) -> Self {
                Self::from_value(value).unwrap_or(Self::Other(value))
            }

            pub fn is_known(self) -> bool {
                !matches!(self, Self::Other(_))
            }
        }

        impl $crate::codec::Wire for $name {
            fn encode(&self, w: &mut $crate::codec::Writer) {
                $crate::codec::Wire::encode(&self.value(), w)
            }

            fn decode(
                r: &mut $crate::codec::Reader<'_>,
            ) -> Result<Self, $crate::codec::DecodeError> {
                Ok(Self::from_raw(<$repr as $crate::codec::Wire>::decode(r)?))
            }
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ty {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const fn value(self) -> $repr {
                match self {
                    $( Self::$variant => $value ),+
                }
            }

            pub fn from_value(value: $repr) -> Option<Self> {
                match value {
                    $( $value => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl $crate::codec::Wire for $name {
            fn encode(&self, w: &mut $crate::codec::Writer) {
                $crate::codec::Wire::encode(&self.value(), w)
            }

            fn decode(
                r: &mut $crate::codec::Reader<'_>,
            ) -> Result<Self, $crate::codec::DecodeError> {
                let value = <$repr as $crate::codec::Wire>::decode(r)?;
                Self::from_value(value).ok_or($crate::codec::DecodeError::UnknownVariant {
                    kind: stringify!($name),
                    value: u32::from(value),
                })
            }
        }
    };
}

/// Declares a record whose fields are encoded back to back, in order.
macro_rules! wire_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize)]
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field : $ty ),+
        }

        impl $crate::codec::Wire for $name {
            fn encode(&self, w: &mut $crate::codec::Writer) {
                $( $crate::codec::Wire::encode(&self.$field, w); )+
            }

            fn decode(
                r: &mut $crate::codec::Reader<'_>,
            ) -> Result<Self, $crate::codec::DecodeError> {
                Ok(Self {
                    $( $field: $crate::codec::Wire::decode(r)?, )+
                })
            }
        }
    };
}
