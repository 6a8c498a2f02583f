//! Namespace and network passthrough modes
//!
//! The runtime owns the grammar of these flags. Well-known forms get typed
//! variants; anything else is kept as `Raw` so it still reaches the runtime
//! verbatim. Rendering a parsed value always gives back the original string.

use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Cgroup namespace
// ============================================================================

/// Value of the runtime's `--cgroupns` flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CgroupNamespace {
    /// Fresh namespace for the container
    Private,
    /// Join the caller's namespace
    Host,
    /// Join the namespace of another running container (name or id)
    Container(String),
    /// Join a namespace by filesystem path
    Path(PathBuf),
    /// Anything the typed variants don't cover
    Raw(String),
}

impl FromStr for CgroupNamespace {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "private" => Self::Private,
            "host" => Self::Host,
            _ => match s.split_once(':') {
                Some(("container", target)) if !target.is_empty() => {
                    Self::Container(target.to_string())
                }
                Some(("ns", path)) if !path.is_empty() => Self::Path(PathBuf::from(path)),
                _ => Self::Raw(s.to_string()),
            },
        })
    }
}

impl fmt::Display for CgroupNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Host => write!(f, "host"),
            Self::Container(target) => write!(f, "container:{}", target),
            Self::Path(path) => write!(f, "ns:{}", path.display()),
            Self::Raw(raw) => write!(f, "{}", raw),
        }
    }
}

// ============================================================================
// Network mode
// ============================================================================

/// Value of the runtime's `--network` flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    /// Share the host network stack
    Host,
    /// Loopback only
    None,
    /// Bridged interface, with optional `key=value` settings in declaration order
    Bridge(Vec<(String, String)>),
    /// Anything the typed variants don't cover
    Raw(String),
}

impl NetworkMode {
    /// Look up a bridge option such as `ip` or `mac`
    pub fn bridge_option(&self, key: &str) -> Option<&str> {
        match self {
            Self::Bridge(options) => options
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

impl FromStr for NetworkMode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "host" => Self::Host,
            "none" => Self::None,
            "bridge" => Self::Bridge(Vec::new()),
            _ => match s.strip_prefix("bridge:").and_then(parse_bridge_options) {
                Some(options) => Self::Bridge(options),
                None => Self::Raw(s.to_string()),
            },
        })
    }
}

fn parse_bridge_options(options: &str) -> Option<Vec<(String, String)>> {
    options
        .split(',')
        .map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::None => write!(f, "none"),
            Self::Bridge(options) if options.is_empty() => write!(f, "bridge"),
            Self::Bridge(options) => {
                write!(f, "bridge:")?;
                for (i, (key, value)) in options.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", key, value)?;
                }
                Ok(())
            }
            Self::Raw(raw) => write!(f, "{}", raw),
        }
    }
}
