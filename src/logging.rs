//! Log routing for the `log` and `defmt-0-3` features.
//!
//! Both backends may be enabled at once. With neither, the arguments are
//! still evaluated so call sites compile identically.

macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        ::log::debug!($($arg)*);
        #[cfg(feature = "defmt-0-3")]
        ::defmt::debug!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt-0-3")))]
        {
            let _ = ($($arg)*);
        }
    }};
}

macro_rules! warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        ::log::warn!($($arg)*);
        #[cfg(feature = "defmt-0-3")]
        ::defmt::warn!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt-0-3")))]
        {
            let _ = ($($arg)*);
        }
    }};
}
