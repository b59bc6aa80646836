//! Target platform of a depot.
//!
//! Depots are published per operating system and CPU architecture. The
//! installer asks for depots matching the machine it runs on and falls back
//! to [`Platform::REFERENCE`] when the provider has nothing for it.
//!
//! # Example
//!
//! ```
//! use depot_schema::{Arch, Os, Platform};
//!
//! let current = Platform::current();
//! println!("Running on: {current}");
//! assert_eq!(Platform::REFERENCE, Platform::new(Os::Windows, Arch::X64));
//! ```

/// Operating system a depot targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// Microsoft Windows.
    #[default]
    Windows,
    /// Linux distributions.
    Linux,
    /// Apple macOS.
    Macos,
}

impl Os {
    /// Operating system of the running process.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Macos
        } else {
            Self::Linux
        }
    }

    /// Wire name, as sent to the content provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Macos => "macos",
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "windows" | "win" | "win64" | "win32" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "macos" | "mac" | "osx" | "darwin" => Ok(Self::Macos),
            _ => Err(format!("Unknown operating system: {s}")),
        }
    }
}

/// CPU architecture a depot targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 32-bit x86.
    X86,
    /// 64-bit x86.
    #[default]
    X64,
    /// 64-bit ARM.
    Arm64,
}

impl Arch {
    /// Architecture of the running process.
    pub fn current() -> Self {
        #[cfg(target_arch = "aarch64")]
        {
            Self::Arm64
        }
        #[cfg(target_arch = "x86")]
        {
            Self::X86
        }
        #[cfg(not(any(target_arch = "aarch64", target_arch = "x86")))]
        {
            Self::X64
        }
    }

    /// Wire name, as sent to the content provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm64 => "arm64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x86" | "i386" | "i686" | "32" => Ok(Self::X86),
            "x64" | "x86_64" | "amd64" | "64" => Ok(Self::X64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}

/// An operating system and architecture pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default,
)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

impl Platform {
    /// Platform every depot set is guaranteed to be published for.
    pub const REFERENCE: Self = Self {
        os: Os::Windows,
        arch: Arch::X64,
    };

    /// Pair an operating system with an architecture.
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Platform of the running process.
    pub fn current() -> Self {
        Self::new(Os::current(), Arch::current())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}
