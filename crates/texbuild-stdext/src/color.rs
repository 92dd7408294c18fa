//! Terminal coloring for diagnostics.
//!
//! Coloring is provided by the
//! [Colored crate](https://docs.rs/colored/latest/colored/), but only when the `color`
//! Cargo feature is enabled.
//! Downstream code calls the methods of the [`Colorize`] trait unconditionally;
//!     without the feature the methods return the input unchanged.
//!
//! ```
//! use texbuild_stdext::color::Colorize;
//! eprintln!["{}: {}", "doc.tex:3".bold(), "Undefined control sequence".bright_red()];
//! ```

#[cfg(feature = "color")]
pub type ColoredString = colored::ColoredString;

#[cfg(not(feature = "color"))]
pub type ColoredString = String;

/// Globally turn coloring on or off, for example when stderr is not a terminal.
pub fn set_enabled(enabled: bool) {
    #[cfg(feature = "color")]
    colored::control::set_override(enabled);
    #[cfg(not(feature = "color"))]
    let _ = enabled;
}

macro_rules! colorize_impl {
    ( $( $method_name: ident, )+ ) => {
        /// Trait that provides coloring methods on strings.
        ///
        /// See the module documentation for information.
        pub trait Colorize {
            $(
                fn $method_name(self) -> ColoredString;
            )+
        }
        #[cfg(feature = "color")]
        impl Colorize for ColoredString {
            $(
                fn $method_name(self) -> ColoredString {
                    colored::Colorize::$method_name(self)
                }
            )+
        }
        #[cfg(feature = "color")]
        impl Colorize for &str {
            $(
                fn $method_name(self) -> ColoredString {
                    colored::Colorize::$method_name(self)
                }
            )+
        }
        #[cfg(not(feature = "color"))]
        impl Colorize for &str {
            $(
                fn $method_name(self) -> ColoredString {
                    self.to_string()
                }
            )+
        }
        #[cfg(not(feature = "color"))]
        impl Colorize for ColoredString {
            $(
                fn $method_name(self) -> ColoredString {
                    self
                }
            )+
        }
    };
}

colorize_impl!(bold, bright_red, bright_yellow, bright_cyan, dimmed,);
