//! Fork / `duppage` cooperation: how a child address space is populated
//! from its parent's at fork time.

use kstub::{KernelError, Page, PageTable, Permission, Va};

/// Duplicate every page the parent has mapped into `child`, per
/// [`duppage`]'s rules.
pub fn fork_address_space<PT: PageTable>(parent: &mut PT, child: &mut PT, exception_stack: Va) -> Result<(), KernelError> {
    for va in parent.mapped_addresses() {
        duppage(parent, child, va, exception_stack)?;
    }
    Ok(())
}

/// Map `va` into `child`, following the parent's page:
///
/// - The exception stack is never shared or COW'd: the child gets a
///   fresh, independent page regardless of the parent's permission bits.
/// - A page marked `SHARE` is mapped into the child with its permission
///   bits untouched -- both processes keep seeing the same writes.
/// - A writable or already-COW page that is *not* `SHARE`d is mapped
///   into the child as COW, then the parent's own mapping is remapped
///   to COW too. The remap happens strictly after the child mapping
///   exists: if it happened first, a write by the parent between the
///   two remaps would convert its page into a private copy before the
///   child ever got to see the shared original.
/// - Anything else (a plain read-only page) is mapped into the child
///   unchanged; neither side can write it, so there is nothing to
///   protect against.
pub fn duppage<PT: PageTable>(parent: &mut PT, child: &mut PT, va: Va, exception_stack: Va) -> Result<(), KernelError> {
    let (page, perm) = parent.lookup(va).expect("duppage on an unmapped address");

    if va == exception_stack {
        child.map(va, Page::new(), Permission::READ | Permission::WRITE | Permission::USER)?;
        return Ok(());
    }

    if perm.contains(Permission::SHARE) {
        child.map(va, page, perm)?;
        return Ok(());
    }

    if perm.contains(Permission::WRITE) || perm.contains(Permission::COW) {
        let cow_perm = (perm - Permission::WRITE) | Permission::COW;
        child.map(va, page.clone(), cow_perm)?;
        parent.map(va, page, cow_perm)?;
        return Ok(());
    }

    child.map(va, page, perm)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kstub::MemPageTable;

    #[test]
    fn exception_stack_is_never_shared_with_the_child() {
        let mut parent = MemPageTable::new();
        let mut child = MemPageTable::new();
        let xstack = Va::new(0xee00_0000);
        parent.map(xstack, Page::new(), Permission::READ | Permission::WRITE | Permission::USER).unwrap();
        duppage(&mut parent, &mut child, xstack, xstack).unwrap();

        let (parent_page, _) = parent.lookup(xstack).unwrap();
        let (child_page, child_perm) = child.lookup(xstack).unwrap();
        assert_ne!(parent_page.identity(), child_page.identity());
        assert!(child_perm.contains(Permission::WRITE));
        assert!(!child_perm.contains(Permission::COW));
    }

    #[test]
    fn writable_page_becomes_cow_on_both_sides() {
        let mut parent = MemPageTable::new();
        let mut child = MemPageTable::new();
        let xstack = Va::new(0xee00_0000);
        let va = Va::new(0x1000);
        parent.map(va, Page::new(), Permission::READ | Permission::WRITE | Permission::USER).unwrap();
        duppage(&mut parent, &mut child, va, xstack).unwrap();

        let (parent_page, parent_perm) = parent.lookup(va).unwrap();
        let (child_page, child_perm) = child.lookup(va).unwrap();
        assert_eq!(parent_page.identity(), child_page.identity());
        assert!(!parent_perm.contains(Permission::WRITE));
        assert!(parent_perm.contains(Permission::COW));
        assert!(!child_perm.contains(Permission::WRITE));
        assert!(child_perm.contains(Permission::COW));
    }

    #[test]
    fn shared_page_keeps_its_permission_bits_verbatim() {
        let mut parent = MemPageTable::new();
        let mut child = MemPageTable::new();
        let xstack = Va::new(0xee00_0000);
        let va = Va::new(0x2000);
        let perm = Permission::READ | Permission::WRITE | Permission::USER | Permission::SHARE;
        parent.map(va, Page::new(), perm).unwrap();
        duppage(&mut parent, &mut child, va, xstack).unwrap();

        let (parent_page, parent_perm) = parent.lookup(va).unwrap();
        let (child_page, child_perm) = child.lookup(va).unwrap();
        assert_eq!(parent_page.identity(), child_page.identity());
        assert_eq!(parent_perm, perm);
        assert_eq!(child_perm, perm);
    }

    #[test]
    fn read_only_page_is_mapped_into_child_unchanged() {
        let mut parent = MemPageTable::new();
        let mut child = MemPageTable::new();
        let xstack = Va::new(0xee00_0000);
        let va = Va::new(0x3000);
        let perm = Permission::READ | Permission::USER;
        parent.map(va, Page::new(), perm).unwrap();
        duppage(&mut parent, &mut child, va, xstack).unwrap();

        let (_, child_perm) = child.lookup(va).unwrap();
        assert_eq!(child_perm, perm);
    }

    #[test]
    fn fork_address_space_duplicates_every_mapped_page() {
        let mut parent = MemPageTable::new();
        let mut child = MemPageTable::new();
        let xstack = Va::new(0xee00_0000);
        parent.map(xstack, Page::new(), Permission::READ | Permission::WRITE | Permission::USER).unwrap();
        parent.map(Va::new(0x1000), Page::new(), Permission::READ | Permission::WRITE | Permission::USER).unwrap();
        parent.map(Va::new(0x2000), Page::new(), Permission::READ | Permission::USER).unwrap();

        fork_address_space(&mut parent, &mut child, xstack).unwrap();

        assert!(child.is_mapped(xstack));
        assert!(child.is_mapped(Va::new(0x1000)));
        assert!(child.is_mapped(Va::new(0x2000)));
    }
}
