//! Package catalog: descriptors, validation and the built-in default list.
//!
//! A catalog is immutable once loaded. Updates replace it wholesale through
//! `AppContext::apply_catalog_update`, never per item.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{PostInstallError, Result};

/// Separator between publisher and application in a package id (`Valve.Steam`).
pub const ID_SEPARATOR: char = '.';

/// One installable application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub id: String,
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reboot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<String>,
}

impl PackageDescriptor {
    pub fn new(name: impl Into<String>, id: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            group: group.into(),
            reboot: None,
            special: None,
        }
    }

    pub fn with_reboot(mut self) -> Self {
        self.reboot = Some(true);
        self
    }

    pub fn with_special(mut self, tag: impl Into<String>) -> Self {
        self.special = Some(tag.into());
        self
    }

    /// True if a successful install should prompt for a reboot.
    pub fn requires_reboot(&self) -> bool {
        self.reboot.unwrap_or(false)
    }

    /// Check the descriptor invariants: non-empty fields, and an id with a
    /// non-empty publisher and application around the first separator.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("name", &self.name), ("id", &self.id), ("group", &self.group)] {
            if value.trim().is_empty() {
                return Err(PostInstallError::validation(format!(
                    "field '{}' must not be empty",
                    field
                )));
            }
        }
        match self.id.trim().split_once(ID_SEPARATOR) {
            Some((publisher, app)) if !publisher.is_empty() && !app.is_empty() => {}
            _ => {
                return Err(PostInstallError::validation(format!(
                    "id '{}' is not of the form Publisher{}Application",
                    self.id, ID_SEPARATOR
                )));
            }
        }
        Ok(())
    }
}

/// Ordered list of package descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    packages: Vec<PackageDescriptor>,
}

impl Catalog {
    pub fn new(packages: Vec<PackageDescriptor>) -> Self {
        Self { packages }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackageDescriptor> {
        self.packages.iter()
    }

    pub fn packages(&self) -> &[PackageDescriptor] {
        &self.packages
    }

    pub fn find(&self, id: &str) -> Option<&PackageDescriptor> {
        self.packages.iter().find(|p| p.id.eq_ignore_ascii_case(id))
    }

    /// Distinct group labels in order of first appearance.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for pkg in &self.packages {
            if !groups.contains(&pkg.group.as_str()) {
                groups.push(&pkg.group);
            }
        }
        groups
    }

    pub fn by_group(&self, group: &str) -> Vec<PackageDescriptor> {
        self.packages
            .iter()
            .filter(|p| p.group.eq_ignore_ascii_case(group))
            .cloned()
            .collect()
    }

    /// Resolve a user selection. The result follows catalog order, not the
    /// order of `ids`, and contains each descriptor at most once.
    pub fn select<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<PackageDescriptor>> {
        for id in ids {
            if self.find(id.as_ref()).is_none() {
                return Err(PostInstallError::UnknownPackage(id.as_ref().to_string()));
            }
        }
        Ok(self
            .packages
            .iter()
            .filter(|p| ids.iter().any(|id| p.id.eq_ignore_ascii_case(id.as_ref())))
            .cloned()
            .collect())
    }

    /// Two catalogs differ if their lengths differ or any element differs in order.
    pub fn differs_from(&self, other: &Catalog) -> bool {
        if self.len() != other.len() {
            return true;
        }
        self.packages
            .iter()
            .zip(other.packages.iter())
            .any(|(a, b)| a != b)
    }

    /// The list shipped with the binary, used when no other source is usable.
    pub fn builtin() -> Self {
        const GAMES: &str = "Games";
        const DEV: &str = "Development";
        const BASE: &str = "Essentials";

        Self::new(vec![
            PackageDescriptor::new("Steam", "Valve.Steam", GAMES),
            PackageDescriptor::new("Epic Games Launcher", "EpicGames.EpicGamesLauncher", GAMES),
            PackageDescriptor::new("Ubisoft Connect", "Ubisoft.Connect", GAMES),
            PackageDescriptor::new("VALORANT (EU)", "RiotGames.Valorant.EU", GAMES)
                .with_reboot()
                .with_special("valorant"),
            PackageDescriptor::new("Visual Studio Code", "Microsoft.VisualStudioCode", DEV),
            PackageDescriptor::new("Git", "Git.Git", DEV),
            PackageDescriptor::new("Cursor", "Anysphere.Cursor", DEV),
            PackageDescriptor::new("Termius", "Termius.Termius", DEV),
            PackageDescriptor::new("Unity Hub", "Unity.UnityHub", DEV),
            PackageDescriptor::new("Google Chrome", "Google.Chrome", BASE),
            PackageDescriptor::new("Telegram", "Telegram.TelegramDesktop", BASE),
            PackageDescriptor::new("7-Zip", "7zip.7zip", BASE),
            PackageDescriptor::new("VLC", "VideoLAN.VLC", BASE),
            PackageDescriptor::new("Paint.NET", "dotPDN.PaintDotNet", BASE),
        ])
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a PackageDescriptor;
    type IntoIter = std::slice::Iter<'a, PackageDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.iter()
    }
}

/// Validate a candidate catalog from an untrusted JSON document.
///
/// Bad entries are logged and dropped. The candidate as a whole is rejected
/// only if it is not a non-empty array or if no entry survives.
pub fn validate(value: &Value, source: &str) -> Result<Catalog> {
    let entries = value.as_array().ok_or_else(|| {
        PostInstallError::validation(format!("{}: catalog is not a JSON array", source))
    })?;
    if entries.is_empty() {
        return Err(PostInstallError::validation(format!(
            "{}: catalog is empty",
            source
        )));
    }

    let mut packages = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match descriptor_from_value(entry) {
            Ok(pkg) => packages.push(pkg),
            Err(e) => warn!("{}: skipping entry #{}: {}", source, index, e),
        }
    }

    if packages.is_empty() {
        return Err(PostInstallError::validation(format!(
            "{}: no valid entries among {}",
            source,
            entries.len()
        )));
    }
    Ok(Catalog::new(packages))
}

/// Parse and validate one entry.
fn descriptor_from_value(entry: &Value) -> Result<PackageDescriptor> {
    let obj = entry
        .as_object()
        .ok_or_else(|| PostInstallError::validation("entry is not an object"))?;

    let required = |field: &str| -> Result<String> {
        match obj.get(field) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(PostInstallError::validation(format!(
                "field '{}' is not a string",
                field
            ))),
            None => Err(PostInstallError::validation(format!(
                "missing field '{}'",
                field
            ))),
        }
    };

    let reboot = match obj.get("reboot") {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => return Err(PostInstallError::validation("field 'reboot' is not a boolean")),
    };
    let special = match obj.get("special") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(PostInstallError::validation("field 'special' is not a string")),
    };

    let pkg = PackageDescriptor {
        name: required("name")?,
        id: required("id")?,
        group: required("group")?,
        reboot,
        special,
    };
    pkg.validate()?;
    Ok(pkg)
}
