//! Role-driven navigation: which menu groups and dashboard a role gets.
use std::collections::BTreeSet;

use crate::role::CanonicalRole;
use crate::store::KeyValueStore;

/// Store key of the left navigation display mode.
pub const LEFT_NAV_MODE_KEY: &str = "ps_leftnav_mode";

/// Navigation group identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupId {
  Common,
  Tms,
  Epsakhi,
  Lpdidi,
  PartnerDesk,
  Administration,
}

/// Which dashboard to mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardVariant {
  Region,
  Partner,
  Admin,
  /// No role-specific dashboard: generic landing page / no-access state
  Placeholder,
}

/// Disjoint partition of canonical roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleBucket {
  Region,
  Partner,
  Admin,
  Unrecognized,
}

impl RoleBucket {
  pub fn of(role: CanonicalRole) -> Self {
    use CanonicalRole::*;
    match role {
      Bmmu | Dmmu | Dcnrlm => Self::Region,
      TrainingPartner | MasterTrainer | CrpEp | CrpLd | TpContactPerson => Self::Partner,
      StateAdmin | PmuAdmin | Smmu => Self::Admin,
      Unknown => Self::Unrecognized,
    }
  }

  fn groups(&self) -> &'static [GroupId] {
    match self {
      Self::Region => &[GroupId::Tms, GroupId::Epsakhi, GroupId::Lpdidi],
      Self::Partner => &[GroupId::Tms, GroupId::PartnerDesk],
      Self::Admin => &[
        GroupId::Tms,
        GroupId::Epsakhi,
        GroupId::Lpdidi,
        GroupId::Administration,
      ],
      Self::Unrecognized => &[],
    }
  }

  fn dashboard(&self) -> DashboardVariant {
    match self {
      Self::Region => DashboardVariant::Region,
      Self::Partner => DashboardVariant::Partner,
      Self::Admin => DashboardVariant::Admin,
      Self::Unrecognized => DashboardVariant::Placeholder,
    }
  }
}

/// What the UI mounts for a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiProjection {
  pub bucket: RoleBucket,
  pub dashboard: DashboardVariant,
  role_groups: BTreeSet<GroupId>,
}

impl UiProjection {
  /// Role-specific groups, without the common section.
  pub fn role_groups(&self) -> &BTreeSet<GroupId> {
    &self.role_groups
  }

  /// Every group to render, common section included.
  pub fn menu_groups(&self) -> BTreeSet<GroupId> {
    let mut groups = self.role_groups.clone();
    groups.insert(GroupId::Common);
    groups
  }

  /// Menu definitions for `menu_groups`, in display order.
  pub fn menu(&self) -> Vec<&'static MenuGroup> {
    let groups = self.menu_groups();
    MENU.iter().filter(|g| groups.contains(&g.id)).collect()
  }
}

/// Menu groups and dashboard for `role`. Total: every role, including
/// `Unknown`, maps to exactly one projection.
pub fn project_ui(role: CanonicalRole) -> UiProjection {
  let bucket = RoleBucket::of(role);
  UiProjection {
    bucket,
    dashboard: bucket.dashboard(),
    role_groups: bucket.groups().iter().copied().collect(),
  }
}

#[derive(Debug, Clone)]
pub struct MenuItem {
  pub label: &'static str,
  pub route: &'static str,
}

#[derive(Debug, Clone)]
pub struct MenuGroup {
  pub id: GroupId,
  pub label: &'static str,
  pub items: &'static [MenuItem],
}

/// All menu groups, in display order
pub const MENU: &[MenuGroup] = &[
  MenuGroup {
    id: GroupId::Common,
    label: "General",
    items: &[
      MenuItem {
        label: "Dashboard",
        route: "/dashboard",
      },
      MenuItem {
        label: "Profile",
        route: "/profile",
      },
    ],
  },
  MenuGroup {
    id: GroupId::Tms,
    label: "Training Management",
    items: &[
      MenuItem {
        label: "Training Requests",
        route: "/tms/training-requests",
      },
      MenuItem {
        label: "Batches",
        route: "/tms/batches",
      },
      MenuItem {
        label: "Certificates",
        route: "/tms/certificates",
      },
    ],
  },
  MenuGroup {
    id: GroupId::Epsakhi,
    label: "EP Sakhi",
    items: &[MenuItem {
      label: "EP Sakhi Register",
      route: "/epsakhi",
    }],
  },
  MenuGroup {
    id: GroupId::Lpdidi,
    label: "Lakhpati Didi",
    items: &[MenuItem {
      label: "Lakhpati Didi Tracker",
      route: "/lpdidi",
    }],
  },
  MenuGroup {
    id: GroupId::PartnerDesk,
    label: "Partner Desk",
    items: &[
      MenuItem {
        label: "Training Centres",
        route: "/partner/centres",
      },
      MenuItem {
        label: "Trainers",
        route: "/partner/trainers",
      },
    ],
  },
  MenuGroup {
    id: GroupId::Administration,
    label: "Administration",
    items: &[
      MenuItem {
        label: "Training Partners",
        route: "/admin/partners",
      },
      MenuItem {
        label: "Training Plans",
        route: "/admin/plans",
      },
      MenuItem {
        label: "Users",
        route: "/admin/users",
      },
    ],
  },
];

/// How the left navigation pane is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeftNavMode {
  #[default]
  Expanded,
  Collapsed,
  Hidden,
}

impl LeftNavMode {
  pub fn from_code(code: i64) -> Self {
    match code {
      1 => Self::Collapsed,
      2 => Self::Hidden,
      _ => Self::Expanded,
    }
  }

  pub fn code(&self) -> i64 {
    match self {
      Self::Expanded => 0,
      Self::Collapsed => 1,
      Self::Hidden => 2,
    }
  }

  pub fn load(store: &KeyValueStore) -> Self {
    store
      .get::<i64>(LEFT_NAV_MODE_KEY)
      .map(Self::from_code)
      .unwrap_or_default()
  }

  pub fn save(&self, store: &KeyValueStore) {
    store.set(LEFT_NAV_MODE_KEY, &self.code());
  }
}
