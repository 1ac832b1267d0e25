//! Access-control mixins shared by the contract models.

use std::collections::{HashMap, HashSet};

use alloy_core::primitives::{Address, B256};

use super::{revert, world::Env};
use crate::abi::{AbiValue, to_hex};

/// Role-based access control with per-role admin roles.
#[derive(Debug, Clone, Default)]
pub(crate) struct AccessControl {
    members: HashMap<B256, HashSet<Address>>,
    admins: HashMap<B256, B256>,
}

impl AccessControl {
    pub fn has_role(&self, role: B256, account: Address) -> bool {
        self.members
            .get(&role)
            .is_some_and(|members| members.contains(&account))
    }

    pub fn check_role(&self, role: B256, account: Address) -> anyhow::Result<()> {
        if self.has_role(role, account) {
            return Ok(());
        }
        Err(revert(format!(
            "AccessControl: account {} is missing role {}",
            to_hex(account),
            to_hex(role)
        )))
    }

    /// Admin role of `role`; the zero role when none was set.
    pub fn role_admin(&self, role: B256) -> B256 {
        self.admins.get(&role).copied().unwrap_or_default()
    }

    pub fn set_role_admin(&mut self, role: B256, admin: B256) {
        self.admins.insert(role, admin);
    }

    pub fn grant(&mut self, role: B256, account: Address) {
        self.members.entry(role).or_default().insert(account);
    }

    pub fn revoke(&mut self, role: B256, account: Address) {
        if let Some(members) = self.members.get_mut(&role) {
            members.remove(&account);
        }
    }

    /// Handle the public access-control functions. Returns `None` for any other function.
    pub fn handle(
        &mut self,
        env: &Env,
        function: &str,
        args: &[AbiValue],
    ) -> anyhow::Result<Option<Vec<AbiValue>>> {
        let outputs = match function {
            "hasRole" => {
                let has = self.has_role(args[0].as_fixed_bytes()?, args[1].as_address()?);
                vec![has.into()]
            }
            "getRoleAdmin" => vec![self.role_admin(args[0].as_fixed_bytes()?).into()],
            "grantRole" => {
                let role = args[0].as_fixed_bytes()?;
                self.check_role(self.role_admin(role), env.sender)?;
                self.grant(role, args[1].as_address()?);
                vec![]
            }
            "revokeRole" => {
                let role = args[0].as_fixed_bytes()?;
                self.check_role(self.role_admin(role), env.sender)?;
                self.revoke(role, args[1].as_address()?);
                vec![]
            }
            "renounceRole" => {
                let account = args[1].as_address()?;
                if account != env.sender {
                    return Err(revert("AccessControl: can only renounce roles for self"));
                }
                self.revoke(args[0].as_fixed_bytes()?, account);
                vec![]
            }
            _ => return Ok(None),
        };
        Ok(Some(outputs))
    }
}

/// Single-owner access control.
#[derive(Debug, Clone)]
pub(crate) struct Ownable {
    owner: Address,
}

impl Ownable {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    pub fn check_owner(&self, account: Address) -> anyhow::Result<()> {
        if account != self.owner {
            return Err(revert("Ownable: caller is not the owner"));
        }
        Ok(())
    }

    /// Handle the public ownership functions. Returns `None` for any other function.
    pub fn handle(
        &mut self,
        env: &Env,
        function: &str,
        args: &[AbiValue],
    ) -> anyhow::Result<Option<Vec<AbiValue>>> {
        let outputs = match function {
            "owner" => vec![self.owner.into()],
            "transferOwnership" => {
                self.check_owner(env.sender)?;
                let new_owner = args[0].as_address()?;
                if new_owner.is_zero() {
                    return Err(revert("Ownable: new owner is the zero address"));
                }
                self.owner = new_owner;
                vec![]
            }
            "renounceOwnership" => {
                self.check_owner(env.sender)?;
                self.owner = Address::ZERO;
                vec![]
            }
            _ => return Ok(None),
        };
        Ok(Some(outputs))
    }
}
