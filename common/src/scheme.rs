use crate::{Cluster, GuestCluster, HostedControlPlane, MachineSet};
use kube::api::ApiResource;
use std::{collections::BTreeMap, fmt};

/// Every kind this operator reads or writes
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Cluster,
    HostedControlPlane,
    GuestCluster,
    MachineSet,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Cluster, Kind::HostedControlPlane, Kind::GuestCluster, Kind::MachineSet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Cluster => "Cluster",
            Kind::HostedControlPlane => "HostedControlPlane",
            Kind::GuestCluster => "GuestCluster",
            Kind::MachineSet => "MachineSet",
        }
    }

    /// Kinds whose definition ships with this operator
    pub fn is_owned(&self) -> bool {
        matches!(self, Kind::HostedControlPlane | Kind::GuestCluster)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable kind table, built once at startup and shared by reference
#[derive(Clone, Debug)]
pub struct Scheme {
    kinds: BTreeMap<Kind, ApiResource>,
}

impl Default for Scheme {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheme {
    pub fn new() -> Self {
        let kinds = BTreeMap::from([
            (Kind::Cluster, ApiResource::erase::<Cluster>(&())),
            (Kind::HostedControlPlane, ApiResource::erase::<HostedControlPlane>(&())),
            (Kind::GuestCluster, ApiResource::erase::<GuestCluster>(&())),
            (Kind::MachineSet, ApiResource::erase::<MachineSet>(&())),
        ]);
        Self { kinds }
    }

    pub fn resource(&self, kind: Kind) -> &ApiResource {
        // every variant is inserted by `new`
        &self.kinds[&kind]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Kind, &ApiResource)> {
        self.kinds.iter()
    }
}
