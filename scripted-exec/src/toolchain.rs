use std::env;

/// External tools used to build and run programs.
///
/// Read from the environment once and passed by reference afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub gcc: String,
    pub gxx: String,
    pub javac: String,
    pub java: String,
    pub python: String,
    /// Kill runs that exceed the documented `timeout_ms`.
    pub enforce_timeout: bool,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            gcc: "gcc".to_string(),
            gxx: "g++".to_string(),
            javac: "javac".to_string(),
            java: "java".to_string(),
            python: "python3".to_string(),
            enforce_timeout: false,
        }
    }
}

impl Toolchain {
    /// `SC_GCC`, `SC_GXX`, `SC_JAVAC`, `SC_JAVA`, `SC_PYTHON` and
    /// `SC_ENFORCE_TIMEOUT=1`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let pick = |key: &str, fallback: String| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(fallback)
        };

        Self {
            gcc: pick("SC_GCC", defaults.gcc),
            gxx: pick("SC_GXX", defaults.gxx),
            javac: pick("SC_JAVAC", defaults.javac),
            java: pick("SC_JAVA", defaults.java),
            python: pick("SC_PYTHON", defaults.python),
            enforce_timeout: lookup("SC_ENFORCE_TIMEOUT").is_some_and(|v| v.trim() == "1"),
        }
    }

    /// Separator between `java -cp` entries.
    pub fn classpath_separator() -> char {
        if cfg!(windows) {
            ';'
        } else {
            ':'
        }
    }
}
