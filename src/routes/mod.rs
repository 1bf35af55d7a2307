/// Router Module Index
///
/// Splits the API into three route groups by audience. Access itself is decided by the
/// route guard (`guard::RoutePolicy`) from the full request path; the groups mirror the
/// prefixes of its table.

/// Routes accessible to anonymous callers (catalog reads, sign-up, sign-in).
pub mod public;

/// Routes requiring any authenticated session.
pub mod authenticated;

/// Routes restricted to staff; `/admin/users` to super admins.
pub mod admin;
