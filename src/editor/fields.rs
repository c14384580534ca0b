use crate::error::{Error, Result};
use crate::hash::{hash_update, intrinsic_hash};
use crate::node::NodeKey;
use crate::page::PageTransaction;
use crate::txn::Inner;

use super::register_name;

impl<P: PageTransaction> Inner<P> {
    /// No-op if `local_name`/`uri` match the current qname; otherwise
    /// refcount-release the old name(s), register the new, and fold the
    /// hash delta up the ancestor chain from the *old* intrinsic hash.
    pub(crate) fn set_qname(&mut self, target: NodeKey, local_name: &str, uri: Option<&str>) -> Result<()> {
        let current = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("set_qname: no such node"))?;
        let named = current
            .named()
            .ok_or(Error::BadArgument("set_qname: node has no name"))?;
        let (new_name_key, new_uri_key) = register_name(&mut self.pages, local_name, uri)?;
        if named.name_key == new_name_key && named.uri_key == new_uri_key {
            super::release_name(&mut self.pages, new_name_key, new_uri_key)?;
            return Ok(());
        }

        let old_name_key = named.name_key;
        let old_uri_key = named.uri_key;
        let old_intrinsic = intrinsic_hash(&current);
        let parent_key = current.parent_key();

        super::release_name(&mut self.pages, old_name_key, old_uri_key)?;

        let mut node = self.pages.prepare(target)?;
        {
            let n = node.named_mut().unwrap();
            n.name_key = new_name_key;
            n.uri_key = new_uri_key;
        }
        hash_update(&mut self.pages, &self.config, parent_key, &mut node, old_intrinsic)?;
        self.pages.finish(node)?;
        Ok(())
    }

    /// No-op if `uri` matches the current URI.
    pub(crate) fn set_uri(&mut self, target: NodeKey, uri: Option<&str>) -> Result<()> {
        let current = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("set_uri: no such node"))?;
        let named = current
            .named()
            .ok_or(Error::BadArgument("set_uri: node has no name"))?;
        let new_uri_key = match uri {
            Some(u) => self.pages.create_name_key(u, crate::node::NameDictKind::Uri)?,
            None => crate::node::NULL_NAME_KEY,
        };
        if named.uri_key == new_uri_key {
            if new_uri_key != crate::node::NULL_NAME_KEY {
                self.pages.remove_name(new_uri_key, crate::node::NameDictKind::Uri)?;
            }
            return Ok(());
        }

        let old_uri_key = named.uri_key;
        let old_intrinsic = intrinsic_hash(&current);
        let parent_key = current.parent_key();

        if old_uri_key != crate::node::NULL_NAME_KEY {
            self.pages.remove_name(old_uri_key, crate::node::NameDictKind::Uri)?;
        }

        let mut node = self.pages.prepare(target)?;
        node.named_mut().unwrap().uri_key = new_uri_key;
        hash_update(&mut self.pages, &self.config, parent_key, &mut node, old_intrinsic)?;
        self.pages.finish(node)?;
        Ok(())
    }

    /// No-op if `value` matches the current (decompressed) value.
    pub(crate) fn set_value(&mut self, target: NodeKey, value: &[u8]) -> Result<()> {
        let current = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("set_value: no such node"))?;
        let valued = current
            .valued()
            .ok_or(Error::BadArgument("set_value: node has no value"))?;
        let current_value = crate::compression::maybe_decompress(&valued.value, valued.compressed)?;
        if current_value == value {
            return Ok(());
        }

        let old_intrinsic = intrinsic_hash(&current);
        let parent_key = current.parent_key();
        let (stored, compressed) = crate::compression::maybe_compress(value, self.config.compression)?;

        let mut node = self.pages.prepare(target)?;
        {
            let v = node.valued_mut().unwrap();
            v.value = stored;
            v.compressed = compressed;
        }
        hash_update(&mut self.pages, &self.config, parent_key, &mut node, old_intrinsic)?;
        self.pages.finish(node)?;
        Ok(())
    }
}
