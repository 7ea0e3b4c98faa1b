//! Recognised top-level output categories and their validators

use crate::session::CheckSession;
use crate::validators::{self, CheckResult};
use crate::value::{Attr, OutputNode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validator for one top-level output
pub type Validator<N> = fn(&mut CheckSession<'_>, &Attr<'_, N>) -> CheckResult<()>;

/// Closed set of output names the checker understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Checks,
    Packages,
    Apps,
    DefaultPackage,
    DevShell,
    DefaultApp,
    LegacyPackages,
    Overlay,
    Overlays,
    NixosModule,
    NixosModules,
    NixosConfigurations,
    HydraJobs,
}

const CATEGORY_NAMES: [(&str, Category); 13] = [
    ("checks", Category::Checks),
    ("packages", Category::Packages),
    ("apps", Category::Apps),
    ("defaultPackage", Category::DefaultPackage),
    ("devShell", Category::DevShell),
    ("defaultApp", Category::DefaultApp),
    ("legacyPackages", Category::LegacyPackages),
    ("overlay", Category::Overlay),
    ("overlays", Category::Overlays),
    ("nixosModule", Category::NixosModule),
    ("nixosModules", Category::NixosModules),
    ("nixosConfigurations", Category::NixosConfigurations),
    ("hydraJobs", Category::HydraJobs),
];

impl Category {
    /// Look up an output name. Unknown names are not an error.
    pub fn from_name(name: &str) -> Option<Self> {
        CATEGORY_NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, category)| *category)
    }

    pub fn name(self) -> &'static str {
        CATEGORY_NAMES
            .iter()
            .find(|(_, category)| *category == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    pub fn all() -> impl Iterator<Item = Category> {
        CATEGORY_NAMES.iter().map(|(_, category)| *category)
    }

    pub fn validator<N: OutputNode>(self) -> Validator<N> {
        match self {
            Category::Checks => validators::checks::<N>,
            Category::Packages => validators::packages::<N>,
            Category::Apps => validators::apps::<N>,
            Category::DefaultPackage | Category::DevShell => validators::default_packages::<N>,
            Category::DefaultApp => validators::default_apps::<N>,
            Category::LegacyPackages => validators::legacy_packages::<N>,
            Category::Overlay => validators::overlay::<N>,
            Category::Overlays => validators::overlays::<N>,
            Category::NixosModule => validators::nixos_module::<N>,
            Category::NixosModules => validators::nixos_modules::<N>,
            Category::NixosConfigurations => validators::nixos_configurations::<N>,
            Category::HydraJobs => validators::hydra_jobs::<N>,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
