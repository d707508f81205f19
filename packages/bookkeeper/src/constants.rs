// A poisoned lock means a panic happened mid-update and the books can no longer be trusted.
pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock - the allocation books \
    may be inconsistent and can no longer be used to detect leaks or invalid frees";
