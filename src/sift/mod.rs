//! Shred engine: progressive sifting (component D, §4.4).

pub mod group;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};

use crate::abort::AbortFlag;
use crate::config::Config;
use crate::digest::{Digest, DigestKind, ExternalState};
use crate::error::{CoreError, CoreResult};
use crate::hasher::{Hasher, ReadMode};
use crate::logger::Logger;
use crate::mount::MountTable;
use crate::paranoid::governor::MemoryGovernor;
use crate::paranoid::{ParanoidHandle, ParanoidVerdict};
use crate::record::Cluster;
use crate::scheduler::{Disposition, Mds, ScheduledTask};

use group::{next_offset, Group, GroupMember, GroupStatus};

pub struct ShredEngine {
    hasher: Arc<Hasher>,
    mds: Arc<Mds>,
    mount_table: Arc<dyn MountTable>,
    governor: Arc<MemoryGovernor>,
    abort: AbortFlag,
    logger: Arc<dyn Logger>,
    threads_per_disk: usize,
}

impl ShredEngine {
    pub fn new(
        mount_table: Arc<dyn MountTable>,
        config: &Config,
        abort: AbortFlag,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let read_mode = if config.use_buffered_read { ReadMode::Buffered } else { ReadMode::Preadv };
        let hasher = Arc::new(Hasher::new(config.threads, read_mode, config.read_buf_len, abort.clone()));
        let mds = Mds::new(config.threads, abort.clone(), logger.clone());
        mds.configure(config.threads_per_disk, config.sweep_count, Arc::new(move |_| Disposition::Consumed));
        ShredEngine {
            hasher,
            mds,
            mount_table,
            governor: Arc::new(MemoryGovernor::new(config.total_mem)),
            abort,
            logger,
            threads_per_disk: config.threads_per_disk.max(1),
        }
    }

    /// Signals every device that no more work is coming and waits for
    /// their worker threads to join. Call once after every size bucket
    /// has been processed.
    pub fn shutdown(&self) {
        self.mds.finish();
    }

    /// Processes one size bucket to completion, returning the resolved
    /// equivalence classes (each a set of clusters sharing a full-file
    /// digest). A returned `Vec` of length 1 is not a duplicate group —
    /// callers feed every result to the finalizer (§4.6), which
    /// suppresses degenerate single-entrant groups.
    pub fn run_size_bucket(
        &self,
        file_size: u64,
        entrants: Vec<Cluster>,
        digest_kind: DigestKind,
        config: &Config,
    ) -> CoreResult<Vec<Vec<Cluster>>> {
        let paranoid = digest_kind == DigestKind::Paranoid;

        // §8 boundary: zero-size files skip hashing; the canonical
        // empty digest is shared by construction, so every entrant of
        // size 0 is trivially one equivalence class.
        if file_size == 0 {
            return Ok(vec![entrants]);
        }

        // §6/§8 scenario 4: entrants with a cached xattr digest already
        // carry a resolved identity — partition them by that value with
        // no file bytes read, before anything enters the hashing stack.
        let (cached, fresh): (Vec<Cluster>, Vec<Cluster>) =
            entrants.into_iter().partition(|c| c.representative.cached_digest.is_some());

        let mut results: Vec<Vec<Cluster>> = Vec::new();

        if !cached.is_empty() {
            let cached_members: Vec<GroupMember> = cached
                .into_iter()
                .map(|cluster| {
                    let (kind, bytes) = cluster
                        .representative
                        .cached_digest
                        .clone()
                        .expect("partitioned on cached_digest.is_some()");
                    GroupMember {
                        cluster,
                        digest: Digest::External(ExternalState::preloaded(bytes)),
                        ignored: false,
                        cached_kind: kind,
                    }
                })
                .collect();
            for mut child in partition_by_digest(cached_members, false, config, &self.logger)? {
                for m in child.iter_mut() {
                    let kind = m.cached_kind;
                    let bytes = m.digest.steal();
                    m.cluster.resolved_digest = Some((kind, bytes));
                }
                results.push(child.into_iter().map(|m| m.cluster).collect());
            }
        }

        if fresh.is_empty() {
            return Ok(results);
        }

        let members: Vec<GroupMember> = fresh
            .into_iter()
            .map(|cluster| GroupMember {
                cluster,
                digest: Digest::new(digest_kind, 0),
                ignored: false,
                cached_kind: digest_kind,
            })
            .collect();

        let mut stack = vec![Group::root(file_size, members)];

        while let Some(mut group) = stack.pop() {
            if self.abort.is_set() {
                // §7 Aborted: in-flight files marked ignored and drained,
                // no emission for this group.
                continue;
            }

            if !is_viable(&group.members, config) {
                for member in group.members {
                    results.push(vec![member.cluster]);
                }
                continue;
            }

            group.status = GroupStatus::StartHashing;
            let target = next_offset(group.hash_offset, group.file_size, group.offset_factor, paranoid);
            let increment_len = target - group.hash_offset;

            if paranoid {
                let required = (group.members.len() as u64 / 2 + 1) * increment_len.min(16 * 1024 * 1024);
                if !self.governor.try_reserve(required) {
                    self.logger.warn("paranoid governor declined admission; group remains dormant this pass");
                }
            }

            group.status = GroupStatus::Hashing;
            group.members = self.hash_members(group.members, group.hash_offset, increment_len);

            if paranoid {
                let required = (group.members.len() as u64 / 2 + 1) * increment_len.min(16 * 1024 * 1024);
                self.governor.release(required);
            }

            let reached_eof = target >= group.file_size;
            let children = match partition_by_digest(group.members, paranoid, config, &self.logger) {
                Ok(children) => children,
                Err(e) => {
                    // §7: a fatal paranoid collision aborts the whole run,
                    // not just this bucket — in-flight buckets stop
                    // emitting on their next iteration.
                    self.abort.set();
                    return Err(e);
                }
            };

            for mut child_members in children {
                if reached_eof || child_members.len() < 2 {
                    if paranoid {
                        for m in &child_members {
                            if let Digest::Paranoid(h) = &m.digest {
                                h.mark_released();
                            }
                        }
                    }
                    if reached_eof && !paranoid {
                        for m in child_members.iter_mut() {
                            let bytes = m.digest.steal();
                            m.cluster.resolved_digest = Some((digest_kind, bytes));
                        }
                    }
                    results.push(child_members.into_iter().map(|m| m.cluster).collect());
                } else {
                    stack.push(Group {
                        file_size: group.file_size,
                        hash_offset: target,
                        offset_factor: group.offset_factor.saturating_mul(8),
                        status: GroupStatus::Dormant,
                        members: child_members,
                    });
                }
            }
        }

        Ok(results)
    }

    /// Submits each member's increment to the multi-disk scheduler (§4.3)
    /// and blocks until every one has completed, since this engine
    /// processes a group's generations as synchronized barriers (see
    /// `sift/group.rs` module doc).
    fn hash_members(&self, members: Vec<GroupMember>, offset: u64, len: u64) -> Vec<GroupMember> {
        let count = members.len();
        let slots: Arc<Mutex<Vec<Option<GroupMember>>>> =
            Arc::new(Mutex::new(members.into_iter().map(Some).collect()));
        let disk_ids: Vec<crate::mount::DiskId> = {
            let guard = slots.lock().unwrap();
            guard.iter().map(|m| m.as_ref().unwrap().cluster.representative.disk_id).collect()
        };

        let pending = Arc::new((Mutex::new(count), Condvar::new()));
        let hasher = self.hasher.clone();
        let abort = self.abort.clone();
        let logger = self.logger.clone();
        let slots_for_handler = slots.clone();
        let pending_for_handler = pending.clone();

        self.mds.configure(
            self.threads_per_disk,
            count.max(1),
            Arc::new(move |task: ScheduledTask| {
                let mut member = slots_for_handler.lock().unwrap()[task.user_data].take();
                if let Some(m) = member.as_mut() {
                    if !abort.is_set() {
                        let digest = std::mem::replace(&mut m.digest, Digest::new(DigestKind::Xxh3, 0));
                        let mut hash_task = hasher.new_task(digest);
                        let path = m.cluster.representative_path().to_path_buf();
                        let is_symlink = m.cluster.representative.is_symlink;
                        match hash_task.hash(&path, task.offset, len, is_symlink) {
                            Ok(_) => m.digest = hash_task.finish(),
                            Err(e) => {
                                let err = crate::error::PathError::from_io(path.clone(), &e);
                                logger.warn(&err.to_string());
                                m.ignored = true;
                                m.digest = hash_task.finish();
                            }
                        }
                    }
                }
                slots_for_handler.lock().unwrap()[task.user_data] = member;

                let (lock, cvar) = &*pending_for_handler;
                let mut remaining = lock.lock().unwrap();
                *remaining -= 1;
                if *remaining == 0 {
                    cvar.notify_all();
                }
                Disposition::Consumed
            }),
        );

        for (i, disk_id) in disk_ids.into_iter().enumerate() {
            let is_rotational = !self.mount_table.is_nonrotational(disk_id);
            let device = self.mds.ensure_device(disk_id, is_rotational);
            device.push_task(ScheduledTask {
                dev: disk_id,
                offset,
                path: std::path::PathBuf::new(),
                user_data: i,
            });
        }

        let (lock, cvar) = &*pending;
        let guard = lock.lock().unwrap();
        drop(cvar.wait_while(guard, |remaining| *remaining > 0));

        // The handler closure installed above keeps its own clone of
        // `slots` alive in `self.mds` until the next generation's
        // `configure` call replaces it, so this can never be the sole
        // owner — drain through the mutex instead of `Arc::try_unwrap`.
        std::mem::take(&mut *slots.lock().unwrap())
            .into_iter()
            .map(|m| m.expect("every slot filled after hashing pass"))
            .collect()
    }
}

fn is_viable(members: &[GroupMember], config: &Config) -> bool {
    if members.len() < 2 {
        return false;
    }
    if config.must_match_tagged && !members.iter().all(|m| m.cluster.representative.tagged) {
        return false;
    }
    if config.must_match_untagged && members.iter().any(|m| m.cluster.representative.tagged) {
        return false;
    }
    if let Some(min_mtime) = config.min_mtime {
        if !members.iter().any(|m| m.cluster.representative.mtime > min_mtime) {
            return false;
        }
    }
    if config.unmatched_basenames {
        let distinct: HashSet<_> = members.iter().map(|m| m.cluster.representative.path_node).collect();
        if distinct.len() < 2 {
            return false;
        }
    }
    true
}

/// §4.4 step 3: look up a child keyed by digest, creating one from the
/// first member as the template. Paranoid mode additionally detects the
/// shadow-hash-collision case (§4.5, §7 `ParanoidCollision`).
fn partition_by_digest(
    members: Vec<GroupMember>,
    paranoid: bool,
    config: &Config,
    logger: &Arc<dyn Logger>,
) -> CoreResult<Vec<Vec<GroupMember>>> {
    let mut children: Vec<Vec<GroupMember>> = Vec::new();

    'member: for member in members {
        if member.ignored {
            continue;
        }
        for child in children.iter_mut() {
            let template = &child[0].digest;
            if template.hash_key() != member.digest.hash_key() {
                continue;
            }
            if paranoid {
                if let (Digest::Paranoid(template_h), Digest::Paranoid(candidate_h)) = (template, &member.digest) {
                    match ParanoidHandle::verdict_against_template(candidate_h, template_h) {
                        ParanoidVerdict::Match => {
                            child.push(member);
                            continue 'member;
                        }
                        ParanoidVerdict::Mismatch => continue,
                        ParanoidVerdict::Collision => {
                            use crate::config::ParanoidCollisionPolicy;
                            match config.paranoid_collision_policy {
                                ParanoidCollisionPolicy::Fatal => {
                                    logger.warn("paranoid collision: shadow hash matched but byte streams diverged, aborting run");
                                    let a = child[0].cluster.representative_path().to_path_buf();
                                    let b = member.cluster.representative_path().to_path_buf();
                                    return Err(CoreError::ParanoidCollision { a, b });
                                }
                                ParanoidCollisionPolicy::LogAndBifurcate => {
                                    logger.warn("paranoid collision treated as mismatch (configured to bifurcate)");
                                }
                            }
                            continue;
                        }
                    }
                }
            } else if Digest::equal(template, &member.digest) {
                child.push(member);
                continue 'member;
            }
        }
        children.push(vec![member]);
    }

    Ok(children)
}
