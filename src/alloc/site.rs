use std::fmt;

/// Where an allocation or release was requested from.
///
/// The site's key (its `Display` form) is `<file>-<line>-<function>`: unique
/// per call site and stable across calls from the same site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallSite<'a> {
    pub file: &'a str,
    pub function: &'a str,
    pub line: u32,
}

impl<'a> CallSite<'a> {
    pub const fn new(file: &'a str, function: &'a str, line: u32) -> Self {
        Self {
            file,
            function,
            line,
        }
    }

    /// The key this site is stored under in the per-site map
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CallSite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.file, self.line, self.function)
    }
}

/// Reduce the type name of a marker fn nested in some function (see
/// [`call_site!`](crate::call_site)) to the name of that function.
#[doc(hidden)]
pub fn enclosing_function(marker: &'static str) -> &'static str {
    let path = marker.strip_suffix("::here").unwrap_or(marker);
    path.rsplit("::")
        .find(|segment| *segment != "{{closure}}")
        .unwrap_or(path)
}

/// Capture the current [`CallSite`]: file, enclosing function and line.
#[macro_export]
macro_rules! call_site {
    () => {{
        fn here() {}
        fn name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::alloc::CallSite::new(
            file!(),
            $crate::alloc::site::enclosing_function(name_of(here)),
            line!(),
        )
    }};
}
