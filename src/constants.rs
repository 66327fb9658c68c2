macro_rules! define_keywords {
    ($($name:ident => $value:expr),*) => {
        $(
            pub const $name: &str = $value;
        )*

        pub const KEYWORDS: [&str; count!($($name,)*)] = [
            $($name),*
        ];
    }
}

macro_rules! count {
    ($first:tt, $($rest:tt, )*) => (1usize + count!($($rest,)*));
    () => (0usize);
}

/// Not a keyword, but the special "discard"/infer identifier.
pub const UNDERSCORE: &str = "_";

/// Not a keyword either: `Include` parses like an ordinary call
/// (`Include("a.frc", "b.frc")`) but is intercepted by the parser
/// before scope lookup (spec.md §4.11), since it must run at parse
/// time rather than become a registered `Callable`.
pub const INCLUDE: &str = "Include";

define_keywords!(
    IF => "if",
    ELSE => "else",
    FUNC => "func",
    TRUE => "true",
    FALSE => "false"
);

/// Default capacity of each process's per-event buffer (spec.md §5).
pub const PROCESS_QUEUE_CAPACITY: usize = 32;

/// Shutdown poll interval once an ExitEvent has been observed (spec.md §4.7).
pub const SHUTDOWN_TICK: std::time::Duration = std::time::Duration::from_millis(200);
