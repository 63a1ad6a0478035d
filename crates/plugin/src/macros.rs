// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared macros.

/// Give a fieldless `Copy` enum a `label()` and a `Display` impl that prints it.
///
/// ```ignore
/// shield_plugin::labels! {
///     Color {
///         Red => "red",
///         Green => "green",
///     }
/// }
/// assert_eq!(Color::Red.label(), "red");
/// ```
#[macro_export]
macro_rules! labels {
    ($enum:ident { $( $variant:ident => $label:literal ),+ $(,)? }) => {
        impl $enum {
            pub const fn label(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}
