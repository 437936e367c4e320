#[macro_export]
macro_rules! enum_with_tryfrom_usize {
    ($(#[$meta:meta])* $vis:vis enum $name:ident {
        $($(#[$vmeta:meta])* $vname:ident $(= $val:expr)?,)*
    }) => {
        $(#[$meta])*
        $vis enum $name {
            $($(#[$vmeta])* $vname $(= $val)?,)*
        }

        impl core::convert::TryFrom<usize> for $name {
            type Error = $crate::utils::ErrorNum;

            fn try_from(v: usize) -> Result<Self, Self::Error> {
                match v {
                    $(x if x == $name::$vname as usize => Ok($name::$vname),)*
                    _ => Err($crate::utils::ErrorNum::ENOSYS),
                }
            }
        }
    }
}

#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {
        $crate::utils::log($crate::utils::LogLevel::Verbose, format_args!($($arg)*))
    }
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::utils::log($crate::utils::LogLevel::Debug, format_args!($($arg)*))
    }
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::utils::log($crate::utils::LogLevel::Info, format_args!($($arg)*))
    }
}

#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {
        $crate::utils::log($crate::utils::LogLevel::Warning, format_args!($($arg)*))
    }
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::utils::log($crate::utils::LogLevel::Error, format_args!($($arg)*))
    }
}

#[macro_export]
macro_rules! milestone {
    ($($arg:tt)*) => {
        $crate::utils::log($crate::utils::LogLevel::Milestone, format_args!($($arg)*))
    }
}

#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::utils::log($crate::utils::LogLevel::Fatal, format_args!($($arg)*))
    }
}

#[macro_export]
macro_rules! print_no_lock {
    ($($arg:tt)*) => {
        $crate::utils::print_no_lock(format_args!($($arg)*))
    }
}
