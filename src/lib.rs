// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! A caching, signing, and composing gateway for Debian package archives.

debcache sits between package clients (`apt` and friends, which expect
`InRelease`, `Packages[.gz|.xz]`, by-hash, and pool objects under the
standard archive layout) and heterogeneous package sources: an upstream
mirror over HTTP, a local directory of `.deb` files, or signed releases
on GitHub. Each configured archive name appears to clients as a single,
internally consistent Debian repository.

# A Tour of Functionality

Control file primitives live in [control]: [control::ControlParagraph]
is the ordered `Name: value` unit everything else is built from, and
[control::ControlParagraphReader] parses streams of them. [deb] extracts
the control paragraph out of a `.deb` archive. [io] holds the
compression codec and content digesting.

Sources implement [source::PackageSource] and produce a
[packages::PackageList]. The [renderer] turns a package list into a
[renderer::RenderedSnapshot]: a clearsigned `InRelease` (see [signer]),
per-architecture `Packages` files in three compression variants, and a
by-hash view whose digests all resolve within the same snapshot.

[repo::Repo] is the serving interface. [repo::DynamicRepo] coordinates
source → renderer with freshness checks and request coalescing;
[repo::UpstreamRepo] passes through to a remote archive;
[repo::CacheRepo] memoizes any of them into a [storage::Storage]
backend ([storage::LruStorage] in memory, [storage::FileStorage] on
disk).

Artifacts from signed GitHub releases are admitted by a
[verify::Verifier]; [verify::RekorVerifier] checks a transparency log
entry's inclusion proof offline and matches the signing certificate
against a declared [verify::FulcioIdentity].

The [server] module maps the archive URL surface onto these operations
and owns process bootstrap.
*/

pub mod control;
pub mod deb;
pub mod error;
pub mod io;
pub mod packages;
pub mod renderer;
pub mod repo;
pub mod server;
pub mod signer;
pub mod source;
pub mod storage;
pub mod verify;
