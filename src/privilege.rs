use nix::unistd::Uid;

/// Answers whether the caller currently holds elevated privilege. Asked at
/// invocation time, never cached, since privilege can change between calls.
pub trait PrivilegeChecker {
    fn is_elevated(&self) -> bool;
}

/// Checks the process's effective uid.
pub struct EffectiveUser;

impl PrivilegeChecker for EffectiveUser {
    fn is_elevated(&self) -> bool {
        Uid::effective().is_root()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedPrivilege(pub bool);

impl PrivilegeChecker for FixedPrivilege {
    fn is_elevated(&self) -> bool {
        self.0
    }
}
