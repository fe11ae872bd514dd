//! Colored console output.
//!
//! Every line is `label: message`, with the label styled only when the
//! target stream supports color. Set `KILN_TRACE` to see `trace!` lines.

#[doc(hidden)]
#[macro_export]
macro_rules! __label {
    ($stream:ident, $label:expr, $style:expr) => {{
        use owo_colors::OwoColorize;

        $label.if_supports_color(owo_colors::Stream::$stream, |s| s.style($style))
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        eprintln!(
            "{}: {}",
            $crate::__label!(Stderr, "error", owo_colors::Style::new().bold().red()),
            format_args!($($arg)+)
        )
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        println!(
            "{}: {}",
            $crate::__label!(Stdout, "warning", owo_colors::Style::new().bold().yellow()),
            format_args!($($arg)+)
        )
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        println!(
            "{}: {}",
            $crate::__label!(Stdout, "info", owo_colors::Style::new().bold().green()),
            format_args!($($arg)+)
        )
    };
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => {
        if std::env::var_os("KILN_TRACE").is_some() {
            println!(
                "{}: {}",
                $crate::__label!(Stdout, "trace", owo_colors::Style::new().bold()),
                format_args!($($arg)+)
            )
        }
    };
}
