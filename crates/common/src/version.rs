use crate::error::{Error, VersionParseError};

/// A four-component semantic version, `major.minor.patch.build`.
///
/// Each component is bounded by `u16::MAX` so the whole version packs
/// into a single `u64` whose integer order equals the component-wise
/// lexicographic order. The packed form is what backing stores persist
/// and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub build: u16,
}

/// The lowest version a live instance may carry; used as the floor when
/// listing all registered services.
pub const ALPHA_VERSION: Version = Version {
    major: 0,
    minor: 0,
    patch: 0,
    build: 1,
};

impl Version {
    pub fn new(major: u16, minor: u16, patch: u16, build: u16) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// Parse the canonical textual form `M.m.p.b`.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let invalid = |source| Error::InvalidVersion {
            text: text.to_string(),
            source,
        };

        let parts: Vec<&str> = text.split('.').collect();
        let &[major, minor, patch, build] = parts.as_slice() else {
            return Err(invalid(VersionParseError::Components));
        };

        let component = |s: &str| s.parse::<u16>().map_err(VersionParseError::from);

        Ok(Self {
            major: component(major).map_err(invalid)?,
            minor: component(minor).map_err(invalid)?,
            patch: component(patch).map_err(invalid)?,
            build: component(build).map_err(invalid)?,
        })
    }

    /// The database-sortable form: sixteen bits per component, major
    /// most significant. Integer comparison of two encodings agrees with
    /// [`Ord`] on the versions themselves.
    pub fn encode_db(&self) -> u64 {
        (self.major as u64) << 48
            | (self.minor as u64) << 32
            | (self.patch as u64) << 16
            | self.build as u64
    }

    /// Total inverse of [`Version::encode_db`]: every `u64` is a valid
    /// encoding.
    pub fn decode_db(encoded: u64) -> Self {
        Self {
            major: (encoded >> 48) as u16,
            minor: (encoded >> 32) as u16,
            patch: (encoded >> 16) as u16,
            build: encoded as u16,
        }
    }

    /// The `v{M.m.p.b}` segment of a handler name.
    pub fn name_prefix(&self) -> String {
        format!("v{self}")
    }

    /// Recover the version from a `{service}:v{M.m.p.b}:{greek}` handler
    /// name.
    pub fn from_instance_name(name: &str) -> Result<Self, Error> {
        let segment = name.split(':').nth(1).unwrap_or_default();
        let Some(text) = segment.strip_prefix('v') else {
            return Err(Error::InvalidVersion {
                text: name.to_string(),
                source: VersionParseError::Components,
            });
        };
        Self::parse(text)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}

impl std::str::FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
